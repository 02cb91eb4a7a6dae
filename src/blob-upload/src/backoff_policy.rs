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

//! Defines traits for backoff policies and common implementations.
//!
//! The client waits before retrying a failed block or a failed commit, giving
//! the network (or the service) time to recover. The default for blocks is
//! [exponential backoff], starting at 5 seconds and tripling on each failure.
//! The default for commits is a constant 5 second delay.
//!
//! # Example
//! ```
//! # use azure_blob_upload::backoff_policy::*;
//! use exponential_backoff::ExponentialBackoffBuilder;
//! use std::time::Duration;
//!
//! let policy = ExponentialBackoffBuilder::new()
//!     .with_initial_delay(Duration::from_millis(500))
//!     .with_maximum_delay(Duration::from_secs(30))
//!     .with_scaling(2.0)
//!     .build()?;
//! let _ = BackoffPolicyArg::from(policy);
//! # Ok::<(), exponential_backoff::Error>(())
//! ```
//!
//! [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff

use std::sync::Arc;
use std::time::Duration;

/// Defines the trait implemented by all backoff strategies.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// Returns the backoff delay on a failure.
    ///
    /// # Parameters
    /// * `loop_start` - when the retry loop started.
    /// * `attempt_count` - the number of attempts. This method is always called
    ///   after the first attempt.
    fn on_failure(&self, loop_start: std::time::Instant, attempt_count: u32) -> Duration;
}

/// A helper type to use [BackoffPolicy] in the client builder.
#[derive(Clone, Debug)]
pub struct BackoffPolicyArg(pub(crate) Arc<dyn BackoffPolicy>);

impl<T: BackoffPolicy + 'static> std::convert::From<T> for BackoffPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn BackoffPolicy>> for BackoffPolicyArg {
    fn from(value: Arc<dyn BackoffPolicy>) -> Self {
        Self(value)
    }
}

/// Waits the same amount of time after every failure.
#[derive(Clone, Debug)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn on_failure(&self, _loop_start: std::time::Instant, _attempt_count: u32) -> Duration {
        self.delay
    }
}

/// The default backoff policy for blocks: 5s, 15s, 45s, 135s, and then 405s.
pub(crate) fn default_block_backoff() -> exponential_backoff::ExponentialBackoff {
    exponential_backoff::ExponentialBackoff {
        initial_delay: Duration::from_secs(5),
        maximum_delay: Duration::from_secs(405),
        scaling: 3.0,
    }
}

/// The default backoff policy for commits.
pub(crate) fn default_commit_backoff() -> ConstantBackoff {
    ConstantBackoff::new(Duration::from_secs(5))
}

pub mod exponential_backoff {
    //! Truncated [exponential backoff].
    //!
    //! Uploads are sequential, and a single client rarely competes with others
    //! for the same object, so the delays carry no jitter.
    //!
    //! [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff

    use std::time::Duration;

    /// The error type for exponential backoff creation.
    #[derive(thiserror::Error, Debug)]
    #[non_exhaustive]
    pub enum Error {
        #[error("the scaling value ({0}) should be >= 1.0")]
        InvalidScalingFactor(f64),
        #[error("the initial delay ({0:?}) should be greater than zero")]
        InvalidInitialDelay(Duration),
        #[error(
            "the maximum delay ({maximum:?}) should be greater than or equal to the initial delay ({initial:?})"
        )]
        EmptyRange {
            maximum: Duration,
            initial: Duration,
        },
    }

    /// Builds an [ExponentialBackoff] policy.
    #[derive(Clone, Debug)]
    pub struct ExponentialBackoffBuilder {
        initial_delay: Duration,
        maximum_delay: Duration,
        scaling: f64,
    }

    impl ExponentialBackoffBuilder {
        /// Creates a builder with the default parameters.
        ///
        /// The defaults match the backoff used for blocks: start at 5 seconds,
        /// triple on each failure, and never wait more than 405 seconds.
        pub fn new() -> Self {
            Self {
                initial_delay: Duration::from_secs(5),
                maximum_delay: Duration::from_secs(405),
                scaling: 3.0,
            }
        }

        /// Change the initial delay.
        pub fn with_initial_delay<V: Into<Duration>>(mut self, v: V) -> Self {
            self.initial_delay = v.into();
            self
        }

        /// Change the maximum delay.
        pub fn with_maximum_delay<V: Into<Duration>>(mut self, v: V) -> Self {
            self.maximum_delay = v.into();
            self
        }

        /// Change the scaling factor in this backoff policy.
        pub fn with_scaling<V: Into<f64>>(mut self, v: V) -> Self {
            self.scaling = v.into();
            self
        }

        /// Creates a new exponential backoff policy.
        ///
        /// # Example
        /// ```
        /// # use azure_blob_upload::backoff_policy::exponential_backoff::*;
        /// # use azure_blob_upload::backoff_policy::BackoffPolicy;
        /// use std::time::Duration;
        /// use std::time::Instant;
        /// let backoff = ExponentialBackoffBuilder::new()
        ///     .with_initial_delay(Duration::from_secs(5))
        ///     .with_maximum_delay(Duration::from_secs(50))
        ///     .with_scaling(2.0)
        ///     .build()?;
        /// assert_eq!(backoff.on_failure(Instant::now(), 1), Duration::from_secs(5));
        /// assert_eq!(backoff.on_failure(Instant::now(), 2), Duration::from_secs(10));
        /// # Ok::<(), Error>(())
        /// ```
        pub fn build(self) -> Result<ExponentialBackoff, Error> {
            if self.scaling.is_nan() || self.scaling < 1.0 {
                return Err(Error::InvalidScalingFactor(self.scaling));
            }
            if self.initial_delay.is_zero() {
                return Err(Error::InvalidInitialDelay(self.initial_delay));
            }
            if self.maximum_delay < self.initial_delay {
                return Err(Error::EmptyRange {
                    maximum: self.maximum_delay,
                    initial: self.initial_delay,
                });
            }
            Ok(ExponentialBackoff {
                initial_delay: self.initial_delay,
                maximum_delay: self.maximum_delay,
                scaling: self.scaling,
            })
        }
    }

    impl Default for ExponentialBackoffBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Implements truncated exponential backoff.
    #[derive(Clone, Debug)]
    pub struct ExponentialBackoff {
        pub(crate) initial_delay: Duration,
        pub(crate) maximum_delay: Duration,
        pub(crate) scaling: f64,
    }

    impl ExponentialBackoff {
        fn delay(&self, attempt_count: u32) -> Duration {
            let exp = std::cmp::min(i32::MAX as u32, attempt_count) as i32;
            let exp = exp.saturating_sub(1);
            let scaling = self.scaling.powi(exp);
            if scaling >= self.maximum_delay.div_duration_f64(self.initial_delay) {
                self.maximum_delay
            } else {
                // scaling >= 1.0 and initial_delay * scaling < maximum_delay,
                // so .mul_f64() cannot panic.
                self.initial_delay.mul_f64(scaling)
            }
        }
    }

    impl super::BackoffPolicy for ExponentialBackoff {
        fn on_failure(&self, _loop_start: std::time::Instant, attempt_count: u32) -> Duration {
            self.delay(attempt_count)
        }
    }
}
