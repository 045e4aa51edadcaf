//! Given/when/then harness for reducers.
//!
//! A test names the state a handler would have loaded and the action it
//! dispatches. Effects are never executed here; the harness only checks what
//! the reducer decided. Facts an effect would feed back are tested by
//! sending them as the action.

#![allow(clippy::module_name_repetitions)]

use eventgram_core::{effect::Effect, reducer::Reducer};

type StateCheck<S> = Box<dyn FnOnce(&S)>;
type EffectCheck<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Drives one reducer through a single action.
///
/// ```ignore
/// ReducerTest::new(PostReducer::new())
///     .with_env(env)
///     .given_state(PostState::new(Actor::Anonymous))
///     .when_action(PostAction::CreatePost { request })
///     .then_state(|state| assert_eq!(state.outcome, Outcome::Failed(ApiError::NotSignedIn)))
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    env: Option<R::Environment>,
    state: Option<R::State>,
    action: Option<R::Action>,
    state_checks: Vec<StateCheck<R::State>>,
    effect_checks: Vec<EffectCheck<R::Action>>,
}

impl<R: Reducer> ReducerTest<R> {
    /// Starts a test of `reducer`.
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            env: None,
            state: None,
            action: None,
            state_checks: Vec::new(),
            effect_checks: Vec::new(),
        }
    }

    /// Environment handed to every `reduce` call.
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// State before the first action.
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.state = Some(state);
        self
    }

    /// The action under test.
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Check on the state after the action was reduced.
    #[must_use]
    pub fn then_state<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Check on the effects the action returned.
    #[must_use]
    pub fn then_effects<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&[Effect<R::Action>]) + 'static,
    {
        self.effect_checks.push(Box::new(check));
        self
    }

    /// Reduces the action and runs the checks.
    ///
    /// # Panics
    ///
    /// Panics when the state, the environment or the action is missing,
    /// and when a check fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self.state.expect("given_state() was not called");
        let env = self.env.expect("with_env() was not called");
        let action = self.action.expect("when_action() was not called");

        let effects = self.reducer.reduce(&mut state, action, &env);

        for check in self.state_checks {
            check(&state);
        }
        for check in self.effect_checks {
            check(&effects);
        }
    }
}

/// Checks over a reducer's effects.
pub mod assertions {
    use eventgram_core::effect::Effect;

    /// Number of `Future` effects.
    #[must_use]
    pub fn count_futures<A>(effects: &[Effect<A>]) -> usize {
        effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Future(_)))
            .count()
    }

    /// The reducer decided without asking for any I/O.
    ///
    /// # Panics
    ///
    /// Panics if any effect other than `Effect::None` is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "expected no effects, got {effects:?}"
        );
    }

    /// Exactly `expected` top-level effects.
    ///
    /// # Panics
    ///
    /// Panics on any other count.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "expected {expected} effects, got {}",
            effects.len()
        );
    }

    /// At least one `Future`.
    ///
    /// # Panics
    ///
    /// Panics if none is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            count_futures(effects) > 0,
            "expected a future effect, got none"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventgram_core::{SmallVec, smallvec};

    #[derive(Debug, Default)]
    struct Window {
        opened: bool,
        closed_at: Option<u32>,
    }

    #[derive(Debug)]
    enum WindowAction {
        Open,
        Closed(u32),
    }

    struct WindowReducer;

    impl Reducer for WindowReducer {
        type State = Window;
        type Action = WindowAction;
        type Environment = u32;

        fn reduce(
            &self,
            state: &mut Window,
            action: WindowAction,
            env: &u32,
        ) -> SmallVec<[Effect<WindowAction>; 4]> {
            match action {
                WindowAction::Open => {
                    state.opened = true;
                    let at = *env;
                    smallvec![
                        Effect::None,
                        Effect::future(async move { Some(WindowAction::Closed(at)) }),
                    ]
                },
                WindowAction::Closed(at) => {
                    state.closed_at = Some(at);
                    smallvec![Effect::None]
                },
            }
        }
    }

    #[test]
    fn command_effects_are_inspected_not_run() {
        ReducerTest::new(WindowReducer)
            .with_env(9)
            .given_state(Window::default())
            .when_action(WindowAction::Open)
            .then_state(|state| {
                assert!(state.opened);
                assert_eq!(state.closed_at, None);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
                assert_eq!(assertions::count_futures(effects), 1);
            })
            .run();
    }

    #[test]
    fn fed_back_facts_are_tested_as_actions() {
        ReducerTest::new(WindowReducer)
            .with_env(9)
            .given_state(Window::default())
            .when_action(WindowAction::Closed(9))
            .then_state(|state| assert_eq!(state.closed_at, Some(9)))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn empty_and_noop_effect_lists_have_no_effects() {
        assertions::assert_no_effects::<WindowAction>(&[]);
        assertions::assert_no_effects::<WindowAction>(&[Effect::None]);
        assert_eq!(assertions::count_futures::<WindowAction>(&[Effect::None]), 0);
    }
}
