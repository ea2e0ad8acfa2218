//! Condition/action rules run against every received message.

use crate::{Bot, ExtendedMessage, Message};

use futures::{future::BoxFuture, FutureExt};
use std::{
    any::Any,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

type ConditionFn = dyn Fn(&Message) -> bool + Send + Sync;
type ActionFn = dyn Fn(Arc<Bot>, Arc<ExtendedMessage>) -> BoxFuture<'static, bool> + Send + Sync;

/// How a matched trigger's action is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// As its own task; dispatch carries on without waiting
    #[default]
    Spawned,
    /// To completion, before the next trigger is considered. Only suitable
    /// for short actions, since the reader waits too.
    Inline,
}

/// A named rule: when `condition` holds for a message, run `action`.
///
/// The action's return value says whether it handled the message. It is
/// logged but does not stop other matching triggers from running.
#[derive(Clone)]
pub struct Trigger {
    name: Arc<str>,
    mode: DispatchMode,
    condition: Arc<ConditionFn>,
    action: Arc<ActionFn>,
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}

impl Trigger {
    pub fn new<C, A, F>(name: impl AsRef<str>, condition: C, action: A) -> Self
    where
        C: Fn(&Message) -> bool + Send + Sync + 'static,
        A: Fn(Arc<Bot>, Arc<ExtendedMessage>) -> F + Send + Sync + 'static,
        F: Future<Output = bool> + Send + 'static,
    {
        Self {
            name: Arc::from(name.as_ref()),
            mode: DispatchMode::Spawned,
            condition: Arc::new(condition),
            action: Arc::new(move |bot, message| action(bot, message).boxed()),
        }
    }

    /// Run this trigger's action inline rather than spawning it
    pub fn inline(mut self) -> Self {
        self.mode = DispatchMode::Inline;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Evaluate the condition. A panic counts as no match.
    pub fn matches(&self, message: &Message) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.condition)(message))) {
            Ok(matched) => matched,
            Err(panic) => {
                tracing::error!(
                    trigger = %self.name,
                    "Trigger condition panicked: {}",
                    panic_message(&*panic)
                );
                false
            }
        }
    }

    /// The action as a self-contained unit of work. Panics, including one
    /// while building the action's future, are caught and logged here.
    fn run(&self, bot: Arc<Bot>, message: Arc<ExtendedMessage>) -> impl Future<Output = ()> {
        let name = Arc::clone(&self.name);
        let action = Arc::clone(&self.action);

        async move {
            let result = AssertUnwindSafe(async move { action(bot, message).await })
                .catch_unwind()
                .await;

            match result {
                Ok(handled) => tracing::trace!(trigger = %name, handled, "Trigger finished"),
                Err(panic) => tracing::error!(
                    trigger = %name,
                    "Trigger action panicked: {}",
                    panic_message(&*panic)
                ),
            }
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// An ordered list of triggers
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trigger. Nothing is de-duplicated.
    pub fn register(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    /// Run every matching trigger against `message`, in registration order.
    ///
    /// Returns how many triggers matched.
    pub async fn dispatch(&self, bot: &Arc<Bot>, message: &Arc<ExtendedMessage>) -> usize {
        let mut matched = 0;

        for trigger in &self.triggers {
            if !trigger.matches(message) {
                continue;
            }
            matched += 1;

            let work = trigger.run(Arc::clone(bot), Arc::clone(message));
            match trigger.mode {
                DispatchMode::Inline => work.await,
                DispatchMode::Spawned => {
                    tokio::spawn(work);
                }
            }
        }

        matched
    }
}
