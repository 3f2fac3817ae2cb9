use std::io::Write;

use anyhow::anyhow;
use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::config::Config;
use crate::render::{NumberedTask, Renderer};
use crate::storage::Slot;
use crate::store::TaskStore;
use crate::task::TaskFilter;

/// Runs one command against the store. With no command the list is shown
/// using `default.filter`. A save that did not reach the slot turns into an
/// error after the command's output is written.
#[instrument(skip(store, cfg, renderer, command, out))]
pub fn dispatch<S: Slot, W: Write>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    command: Option<Command>,
    out: &mut W,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command.unwrap_or(Command::List { filter: None }) {
        Command::Add { text } => cmd_add(store, &text.join(" "), out)?,
        Command::List { filter } => {
            let filter = match filter {
                Some(filter) => filter,
                None => cfg.default_filter()?,
            };
            cmd_list(store, renderer, filter, out)?
        }
        Command::Toggle { reference } => cmd_toggle(store, &reference, out)?,
        Command::Edit { reference, text } => cmd_edit(store, &reference, &text.join(" "), out)?,
        Command::Delete { reference } => cmd_delete(store, &reference, out)?,
        Command::Count => renderer.write_counts(out, store.counts())?,
        Command::Export => cmd_export(store, out)?,
    }

    if let Some(err) = store.last_save_error() {
        return Err(anyhow!("tasks were not saved: {err}"));
    }
    Ok(())
}

/// Resolves a full id, a 1-based position, or a unique id prefix. All-digit
/// refs never fall through to prefix matching.
pub fn resolve_ref<S: Slot>(store: &TaskStore<S>, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if let Some(task) = store.get(reference) {
        return Some(task.id.clone());
    }

    let tasks = store.tasks();
    if let Ok(position) = reference.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|idx| tasks.get(idx))
            .map(|t| t.id.clone());
    }

    let mut matches = tasks.iter().filter(|t| t.id.starts_with(reference));
    let first = matches.next()?;
    if matches.next().is_some() {
        debug!(reference, "id prefix is ambiguous");
        None
    } else {
        Some(first.id.clone())
    }
}

fn position_of<S: Slot>(store: &TaskStore<S>, id: &str) -> Option<usize> {
    store.tasks().iter().position(|t| t.id == id).map(|idx| idx + 1)
}

#[instrument(skip(store, text, out))]
fn cmd_add<S: Slot, W: Write>(
    store: &mut TaskStore<S>,
    text: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    match store.add(text) {
        Some(id) => {
            let position = position_of(store, &id).unwrap_or(1);
            writeln!(out, "Created task {position}.")?;
        }
        None => writeln!(out, "Nothing to add.")?,
    }
    Ok(())
}

#[instrument(skip(store, renderer, out))]
fn cmd_list<S: Slot, W: Write>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    filter: TaskFilter,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    store.set_filter(filter);
    let store: &TaskStore<S> = store;

    let numbered: Vec<NumberedTask<'_>> = store
        .visible_tasks()
        .map(|task| (position_of(store, &task.id).unwrap_or_default(), task))
        .collect();

    renderer.write_task_list(out, &numbered, store.filter(), store.counts())
}

#[instrument(skip(store, out))]
fn cmd_toggle<S: Slot, W: Write>(
    store: &mut TaskStore<S>,
    reference: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command toggle");

    let Some(id) = resolve_ref(store, reference) else {
        writeln!(out, "No task matches {reference}.")?;
        return Ok(());
    };

    let position = position_of(store, &id).unwrap_or_default();
    match store.toggle(&id) {
        Some(true) => writeln!(out, "Completed task {position}.")?,
        Some(false) => writeln!(out, "Reopened task {position}.")?,
        None => writeln!(out, "No task matches {reference}.")?,
    }
    Ok(())
}

#[instrument(skip(store, text, out))]
fn cmd_edit<S: Slot, W: Write>(
    store: &mut TaskStore<S>,
    reference: &str,
    text: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command edit");

    let Some(id) = resolve_ref(store, reference) else {
        writeln!(out, "No task matches {reference}.")?;
        return Ok(());
    };
    let current = store.get(&id).map(|t| t.text.clone()).unwrap_or_default();
    let position = position_of(store, &id).unwrap_or_default();

    store.begin_edit(&id, &current);
    store.update_draft(text);
    if store.commit_edit() {
        writeln!(out, "Updated task {position}.")?;
    } else {
        writeln!(out, "Task {position} unchanged.")?;
    }
    Ok(())
}

#[instrument(skip(store, out))]
fn cmd_delete<S: Slot, W: Write>(
    store: &mut TaskStore<S>,
    reference: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");

    let Some(id) = resolve_ref(store, reference) else {
        writeln!(out, "No task matches {reference}.")?;
        return Ok(());
    };

    let position = position_of(store, &id).unwrap_or_default();
    if store.remove(&id) {
        writeln!(out, "Deleted task {position}.")?;
    }
    Ok(())
}

fn cmd_export<S: Slot, W: Write>(store: &TaskStore<S>, out: &mut W) -> anyhow::Result<()> {
    let persistence = store.persistence();
    let raw = persistence
        .slot()
        .get(persistence.key())?
        .unwrap_or_else(|| "[]".to_string());
    writeln!(out, "{raw}")?;
    Ok(())
}
