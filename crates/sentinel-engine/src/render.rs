//! Human-facing text: record comments and chat messages.

use crate::detect::SLA_COLLAPSED_REVERT;
use crate::revert::RevertPlan;
use sentinel_types::{Actor, ChangeDetection};

fn actor_display(actor: &Actor) -> &str {
    if !actor.name.is_empty() {
        &actor.name
    } else if let Some(ref email) = actor.email {
        email
    } else {
        &actor.id
    }
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn bullets(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("- {}\n", l)).collect()
}

pub(crate) fn violation_lines(changes: &[ChangeDetection]) -> Vec<&str> {
    unique(changes.iter().map(|c| c.description.as_str()))
}

/// Only fields the plan writes. A plan that restores SLA alongside priority gets an SLA line
/// even when no SLA change was listed.
pub(crate) fn restored_lines<'a>(changes: &'a [ChangeDetection], plan: &RevertPlan) -> Vec<&'a str> {
    let written = move || changes.iter().filter(move |c| plan.writes(c.field));
    let mut lines = unique(written().map(|c| c.revert_description.as_str()));
    if plan.update.touches_sla() && !written().any(|c| c.field.is_writable_sla()) {
        lines.push(SLA_COLLAPSED_REVERT);
    }
    lines
}

/// Comment posted after a successful revert.
pub fn revert_comment(actor: &Actor, changes: &[ChangeDetection], plan: &RevertPlan) -> String {
    format!(
        "**Protected field change reverted**\n\n\
         {} changed protected fields on this issue without authorization:\n{}\n\
         The following values were restored:\n{}\n\
         Changes to protected issues must be made by an authorized team member.",
        actor_display(actor),
        bullets(&violation_lines(changes)),
        bullets(&restored_lines(changes, plan)),
    )
}

/// Comment posted in notify-only mode.
pub fn notice_comment(actor: &Actor, changes: &[ChangeDetection], plan: &RevertPlan) -> String {
    format!(
        "**Unauthorized change to a protected issue**\n\n\
         {} changed protected fields on this issue without authorization:\n{}\n\
         These changes would have been reverted:\n{}\n\
         Enforcement is running in notify-only mode, so nothing was changed.",
        actor_display(actor),
        bullets(&violation_lines(changes)),
        bullets(&restored_lines(changes, plan)),
    )
}

pub(crate) fn chat_message(
    record: &str,
    actor: &Actor,
    changes: &[ChangeDetection],
    reverted: bool,
) -> String {
    let verb = if reverted { "Reverted" } else { "Detected" };
    format!(
        ":shield: {} unauthorized change on {} by {}: {}",
        verb,
        record,
        actor_display(actor),
        violation_lines(changes).join("; ")
    )
}
