//! Side effect descriptions and their executor.
//!
//! Effects are values. A reducer returns them; nothing happens until the shell
//! hands them to [`execute`] after the state change has been committed.

use futures::future::{BoxFuture, FutureExt, join_all};
use std::future::Future;
use std::pin::Pin;

/// Describes a side effect to run after a state change commits.
///
/// # Type Parameters
///
/// - `Action`: the action type an effect may feed back into the reducer
pub enum Effect<Action> {
    /// No-op effect
    None,

    /// Run effects concurrently
    Parallel(Vec<Effect<Action>>),

    /// Run effects one after another, in order
    Sequential(Vec<Effect<Action>>),

    /// Arbitrary async computation.
    ///
    /// Resolves to `Some(action)` when the outcome should be fed back.
    Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
}

// Future has no Debug impl, so this one is written by hand.
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
            Effect::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
        }
    }
}

impl<Action> Effect<Action> {
    /// Combine effects to run in parallel
    #[must_use]
    pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Parallel(effects)
    }

    /// Chain effects to run sequentially
    #[must_use]
    pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Sequential(effects)
    }

    /// Returns `true` if running this effect can never do anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Effect::None => true,
            Effect::Parallel(effects) | Effect::Sequential(effects) => {
                effects.iter().all(Effect::is_noop)
            },
            Effect::Future(_) => false,
        }
    }
}

/// Run a batch of effects in the order they were returned.
///
/// Resolves to every action the effects fed back, in completion order. The
/// caller decides whether those are dispatched again or only logged.
pub async fn execute<Action, I>(effects: I) -> Vec<Action>
where
    Action: Send + 'static,
    I: IntoIterator<Item = Effect<Action>>,
{
    let mut feedback = Vec::new();
    for effect in effects {
        feedback.extend(run(effect).await);
    }
    feedback
}

fn run<Action>(effect: Effect<Action>) -> BoxFuture<'static, Vec<Action>>
where
    Action: Send + 'static,
{
    async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Future(future) => future.await.into_iter().collect(),
            Effect::Sequential(effects) => {
                let mut feedback = Vec::new();
                for effect in effects {
                    feedback.extend(run(effect).await);
                }
                feedback
            },
            Effect::Parallel(effects) => join_all(effects.into_iter().map(run))
                .await
                .into_iter()
                .flatten()
                .collect(),
        }
    }
    .boxed()
}

/// Create an `Effect::Future` from an async block
///
/// ```rust,ignore
/// use seatkeeper_core::async_effect;
///
/// async_effect! {
///     notifier.notify(&event).await;
///     None
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Done(u32),
    }

    #[tokio::test]
    async fn test_execute_collects_feedback_in_order() {
        let effects = vec![
            crate::async_effect! { Some(TestAction::Done(1)) },
            Effect::None,
            Effect::chain(vec![
                crate::async_effect! { Some(TestAction::Done(2)) },
                crate::async_effect! { None },
                crate::async_effect! { Some(TestAction::Done(3)) },
            ]),
        ];

        let feedback = execute(effects).await;
        assert_eq!(
            feedback,
            vec![TestAction::Done(1), TestAction::Done(2), TestAction::Done(3)]
        );
    }

    #[tokio::test]
    async fn test_parallel_runs_every_branch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let branches = (0..5)
            .map(|_| {
                let counter = Arc::clone(&counter);
                crate::async_effect! {
                    counter.fetch_add(1, Ordering::SeqCst);
                    None::<TestAction>
                }
            })
            .collect();

        let feedback = execute([Effect::merge(branches)]).await;
        assert!(feedback.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_is_noop() {
        assert!(Effect::<TestAction>::None.is_noop());
        assert!(Effect::<TestAction>::chain(vec![Effect::None, Effect::merge(vec![])]).is_noop());
        assert!(!crate::async_effect! { None::<TestAction> }.is_noop());
    }
}
