// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the retry policies for blocks and commits.
//!
//! The client retries failed block writes and failed commits. Before each
//! retry it waits (see [backoff_policy][crate::backoff_policy]) and then
//! fetches a new upload URI, as the previous one may have expired.
//!
//! A retry policy decides if a failure should be retried. The default policy
//! for blocks gives up after 5 attempts for the same block. The default policy
//! for commits never gives up, only cancelling the upload stops it.
//!
//! # Example
//! ```
//! # use azure_blob_upload::retry_policy::*;
//! use std::time::Duration;
//! // Try each block up to 3 times.
//! let block_policy = Recommended.with_attempt_limit(3);
//! // Stop retrying the commit after 10 minutes.
//! let commit_policy = Recommended.with_time_limit(Duration::from_secs(600));
//! # let _ = (RetryPolicyArg::from(block_policy), RetryPolicyArg::from(commit_policy));
//! ```

use crate::Error;
use std::sync::Arc;
use std::time::Duration;

/// The result of a retry policy decision.
#[derive(Debug)]
pub enum RetryResult {
    /// The error cannot be fixed by retrying.
    Permanent(Error),
    /// The error could be fixed by retrying, but the policy has no attempts
    /// (or time) left.
    Exhausted(Error),
    /// Retry the operation.
    Continue(Error),
}

impl RetryResult {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// The state of a retry loop, as seen by a [RetryPolicy].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct RetryState {
    /// When the retry loop started.
    pub loop_start: std::time::Instant,
    /// The number of attempts so far, including the one that just failed.
    pub attempt_count: u32,
}

impl RetryState {
    pub fn new(loop_start: std::time::Instant, attempt_count: u32) -> Self {
        Self {
            loop_start,
            attempt_count,
        }
    }
}

/// Determines how errors are handled in the retry loop.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Decides if the operation should be retried after `error`.
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult;
}

/// Decorators for retry policies.
pub trait RetryPolicyExt: RetryPolicy + Sized {
    /// Gives up after `maximum_attempts` attempts.
    ///
    /// The limit includes the initial attempt, so `with_attempt_limit(5)`
    /// allows at most 4 retries.
    fn with_attempt_limit(self, maximum_attempts: u32) -> LimitedAttemptCount<Self> {
        LimitedAttemptCount::new(self, maximum_attempts)
    }

    /// Gives up once `maximum_duration` has elapsed since the first attempt.
    fn with_time_limit(self, maximum_duration: Duration) -> LimitedElapsedTime<Self> {
        LimitedElapsedTime::new(self, maximum_duration)
    }
}

impl<T: RetryPolicy> RetryPolicyExt for T {}

/// A helper type to use [RetryPolicy] in the client builder.
#[derive(Clone, Debug)]
pub struct RetryPolicyArg(pub(crate) Arc<dyn RetryPolicy>);

impl<T: RetryPolicy + 'static> std::convert::From<T> for RetryPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn RetryPolicy>> for RetryPolicyArg {
    fn from(value: Arc<dyn RetryPolicy>) -> Self {
        Self(value)
    }
}

/// Retries network, service, and token errors without limit.
///
/// Local errors, such as invalid requests, are never retried.
#[derive(Clone, Debug)]
pub struct Recommended;

impl RetryPolicy for Recommended {
    fn on_error(&self, _state: &RetryState, error: Error) -> RetryResult {
        if error.is_binding() || error.is_read() || error.is_cancelled() {
            return RetryResult::Permanent(error);
        }
        RetryResult::Continue(error)
    }
}

/// Retries all errors.
#[derive(Clone, Debug)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn on_error(&self, _state: &RetryState, error: Error) -> RetryResult {
        RetryResult::Continue(error)
    }
}

/// Never retries.
#[derive(Clone, Debug)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn on_error(&self, _state: &RetryState, error: Error) -> RetryResult {
        RetryResult::Exhausted(error)
    }
}

/// Stops retrying after a number of attempts.
#[derive(Clone, Debug)]
pub struct LimitedAttemptCount<P> {
    inner: P,
    maximum_attempts: u32,
}

impl<P> LimitedAttemptCount<P> {
    pub fn new(inner: P, maximum_attempts: u32) -> Self {
        Self {
            inner,
            maximum_attempts,
        }
    }
}

impl<P> RetryPolicy for LimitedAttemptCount<P>
where
    P: RetryPolicy,
{
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        match self.inner.on_error(state, error) {
            RetryResult::Continue(e) if state.attempt_count >= self.maximum_attempts => {
                RetryResult::Exhausted(e)
            }
            result => result,
        }
    }
}

/// Stops retrying once some time has elapsed since the loop started.
#[derive(Clone, Debug)]
pub struct LimitedElapsedTime<P> {
    inner: P,
    maximum_duration: Duration,
}

impl<P> LimitedElapsedTime<P> {
    pub fn new(inner: P, maximum_duration: Duration) -> Self {
        Self {
            inner,
            maximum_duration,
        }
    }

    fn on_error_now(
        &self,
        now: std::time::Instant,
        state: &RetryState,
        error: Error,
    ) -> RetryResult
    where
        P: RetryPolicy,
    {
        match self.inner.on_error(state, error) {
            RetryResult::Continue(e)
                if now.saturating_duration_since(state.loop_start) >= self.maximum_duration =>
            {
                RetryResult::Exhausted(e)
            }
            result => result,
        }
    }
}

impl<P> RetryPolicy for LimitedElapsedTime<P>
where
    P: RetryPolicy,
{
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        self.on_error_now(tokio::time::Instant::now().into_std(), state, error)
    }
}

/// The default retry policy for blocks.
pub(crate) fn default_block_retry() -> LimitedAttemptCount<Recommended> {
    Recommended.with_attempt_limit(5)
}

/// The default retry policy for commits.
pub(crate) fn default_commit_retry() -> Recommended {
    Recommended
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    mockall::mock! {
        #[derive(Debug)]
        Policy {}
        impl RetryPolicy for Policy {
            fn on_error(&self, state: &RetryState, error: Error) -> RetryResult;
        }
    }

    fn state(attempt_count: u32) -> RetryState {
        RetryState::new(Instant::now(), attempt_count)
    }

    fn transient() -> Error {
        Error::block_upload("test-only")
    }

    #[test]
    fn retry_result() {
        let r = RetryResult::Permanent(transient());
        assert!(r.is_permanent() && !r.is_exhausted() && !r.is_continue(), "{r:?}");
        let r = RetryResult::Exhausted(transient());
        assert!(!r.is_permanent() && r.is_exhausted() && !r.is_continue(), "{r:?}");
        let r = RetryResult::Continue(transient());
        assert!(!r.is_permanent() && !r.is_exhausted() && r.is_continue(), "{r:?}");
    }

    #[test]
    fn recommended() {
        let p = Recommended;
        assert!(p.on_error(&state(1), transient()).is_continue());
        assert!(p.on_error(&state(100), Error::commit("e")).is_continue());
        assert!(p.on_error(&state(1), Error::token_fetch("e")).is_continue());
        assert!(p.on_error(&state(1), Error::binding("e")).is_permanent());
        assert!(p.on_error(&state(1), Error::read("e")).is_permanent());
        assert!(p.on_error(&state(1), Error::cancelled()).is_permanent());
    }

    #[test]
    fn always_and_never() {
        assert!(AlwaysRetry.on_error(&state(1), Error::binding("e")).is_continue());
        assert!(NeverRetry.on_error(&state(1), transient()).is_exhausted());
    }

    #[test]
    fn attempt_limit() {
        let policy = Recommended.with_attempt_limit(5);
        for attempt in 1..5 {
            let r = policy.on_error(&state(attempt), transient());
            assert!(r.is_continue(), "{attempt} {r:?}");
        }
        let r = policy.on_error(&state(5), transient());
        assert!(r.is_exhausted(), "{r:?}");
        let r = policy.on_error(&state(1), Error::read("e"));
        assert!(r.is_permanent(), "{r:?}");
    }

    #[test]
    fn attempt_limit_forwards() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1)
            .returning(|_, e| RetryResult::Permanent(e));
        let policy = mock.with_attempt_limit(3);
        let r = policy.on_error(&state(1), transient());
        assert!(r.is_permanent(), "{r:?}");
    }

    #[test]
    fn time_limit() {
        let policy = Recommended.with_time_limit(Duration::from_secs(60));
        let start = Instant::now();
        let s = RetryState::new(start, 3);
        let r = policy.on_error_now(start + Duration::from_secs(10), &s, transient());
        assert!(r.is_continue(), "{r:?}");
        let r = policy.on_error_now(start + Duration::from_secs(60), &s, transient());
        assert!(r.is_exhausted(), "{r:?}");
        let r = policy.on_error_now(start, &s, Error::binding("e"));
        assert!(r.is_permanent(), "{r:?}");
    }

    #[test]
    fn time_limit_inner_exhausted() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1)
            .returning(|_, e| RetryResult::Exhausted(e));
        let policy = mock.with_time_limit(Duration::from_secs(60));
        let r = policy.on_error(&state(1), transient());
        assert!(r.is_exhausted(), "{r:?}");
    }

    #[test]
    fn defaults() {
        let block = default_block_retry();
        assert!(block.on_error(&state(4), transient()).is_continue());
        assert!(block.on_error(&state(5), transient()).is_exhausted());

        let commit = default_commit_retry();
        let r = commit.on_error(&state(10_000), Error::commit("e"));
        assert!(r.is_continue(), "{r:?}");
    }

    #[test]
    fn retry_policy_arg() {
        let _ = RetryPolicyArg::from(Recommended);
        let policy: Arc<dyn RetryPolicy> = Arc::new(AlwaysRetry);
        let _ = RetryPolicyArg::from(policy);
    }
}
