//! # Raffle Core
//!
//! Core traits and types for the raffle draw engine.
//!
//! The engine is built around the Reducer pattern: every operator request is an
//! action, the reducer validates it against the current state and describes the
//! side effects (persistence calls, timed highlight ticks) it needs. The runtime
//! executes those effects and feeds their outcome back as new actions.
//!
//! ## Core Concepts
//!
//! - **State**: The in-memory mirror of participants, prizes and winners
//! - **Action**: All possible inputs to a reducer (commands and their outcomes)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits (clock, randomness, storage)
//!
//! ## Example
//!
//! ```ignore
//! use raffle_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! impl Reducer for RaffleReducer {
//!     type State = RaffleState;
//!     type Action = RaffleAction;
//!     type Environment = RaffleEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut RaffleState,
//!         action: RaffleAction,
//!         env: &RaffleEnvironment,
//!     ) -> SmallVec<[Effect<RaffleAction>; 4]> {
//!         // Business logic goes here
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// Persistence collaborator abstraction (list/create/delete/deleteAll/updateRank)
pub mod record_store;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution): a reducer returning an effect has not
/// touched storage or slept yet.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Delayed action (highlight ticks, settle pause)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
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

        /// Dispatch `action` after `duration`
        #[must_use]
        pub fn delay(duration: Duration, action: Action) -> Effect<Action> {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
        }

        /// Feed `action` straight back into the store.
        ///
        /// Used for outcomes decided synchronously by the reducer (rejections,
        /// ignored commands) so that observers waiting on the action stream
        /// still see a terminal action.
        #[must_use]
        pub fn send(action: Action) -> Effect<Action>
        where
            Action: Send + 'static,
        {
            Effect::Future(Box::pin(async move { Some(action) }))
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter, so reducers stay deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};
    use rand::Rng;

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of uniformly distributed indices.
    ///
    /// Every draw decision goes through this trait so tests can script the
    /// outcome while production uses a fresh thread-local RNG per call.
    pub trait RandomSource: Send + Sync {
        /// Returns an index uniformly distributed over `[0, len)`.
        ///
        /// Callers must not pass `len == 0`; implementations return `0` in that case.
        fn pick(&self, len: usize) -> usize;
    }

    /// Production randomness via `rand::thread_rng`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ThreadRandom;

    impl RandomSource for ThreadRandom {
        fn pick(&self, len: usize) -> usize {
            if len == 0 {
                return 0;
            }
            rand::thread_rng().gen_range(0..len)
        }
    }
}
