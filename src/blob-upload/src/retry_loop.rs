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

use crate::backoff_policy::BackoffPolicy;
use crate::retry_policy::{RetryPolicy, RetryResult, RetryState};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the retry loop for a given function.
///
/// This function calls `inner` until (1) it succeeds, (2) the retry policy
/// rejects the error, or (3) `cancel` is triggered. `inner` receives the
/// attempt number, starting at 1.
///
/// In between calls the function waits the amount of time prescribed by the
/// backoff policy, using `sleep` to implement any sleep. Cancellation
/// interrupts both the sleep and any attempt in progress.
///
/// The `on_retry` callback is called before sleeping, with the attempt count,
/// the error, and the delay.
pub(crate) async fn retry_loop<F, S, OnRetry, Response>(
    mut inner: F,
    sleep: S,
    retry_policy: Arc<dyn RetryPolicy>,
    backoff_policy: Arc<dyn BackoffPolicy>,
    cancel: &CancellationToken,
    mut on_retry: OnRetry,
) -> Result<Response>
where
    F: AsyncFnMut(u32) -> Result<Response>,
    S: AsyncFn(Duration) -> (),
    OnRetry: FnMut(u32, &Error, Duration),
{
    let loop_start = tokio::time::Instant::now().into_std();
    let mut attempt_count = 0_u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        attempt_count += 1;
        let result = tokio::select! {
            r = inner(attempt_count) => r,
            _ = cancel.cancelled() => return Err(Error::cancelled()),
        };
        let error = match result {
            Ok(r) => return Ok(r),
            Err(e) => e,
        };
        let state = RetryState::new(loop_start, attempt_count);
        let error = match retry_policy.on_error(&state, error) {
            RetryResult::Permanent(e) => return Err(e),
            RetryResult::Exhausted(e) => return Err(Error::exhausted(e)),
            RetryResult::Continue(e) => e,
        };
        let delay = backoff_policy.on_failure(loop_start, attempt_count);
        on_retry(attempt_count, &error, delay);
        tokio::select! {
            _ = sleep(delay) => {},
            _ = cancel.cancelled() => return Err(Error::cancelled()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff_policy::ConstantBackoff;
    use crate::retry_policy::{Recommended, RetryPolicyExt};
    use std::error::Error as _;
    use std::sync::Mutex;

    #[tokio::test]
    async fn immediate_success() -> anyhow::Result<()> {
        let mut call = MockCall::new();
        call.expect_call().once().returning(|_| success());
        let inner = async move |n| call.call(n);

        let retry_policy = MockRetryPolicy::new();
        let backoff_policy = MockBackoffPolicy::new();
        let sleep = MockSleep::new();
        let backoff = async move |d| sleep.sleep(d).await;

        let response = retry_loop(
            inner,
            backoff,
            Arc::new(retry_policy),
            Arc::new(backoff_policy),
            &CancellationToken::new(),
            |_, _, _| panic!("no retries expected"),
        )
        .await?;
        assert_eq!(response, "success");
        Ok(())
    }

    #[tokio::test]
    async fn permanent_error() -> anyhow::Result<()> {
        let mut call = MockCall::new();
        call.expect_call()
            .once()
            .returning(|_| Err(Error::binding("bad request")));
        let inner = async move |n| call.call(n);

        let mut retry_policy = MockRetryPolicy::new();
        retry_policy
            .expect_on_error()
            .once()
            .returning(|_, e| RetryResult::Permanent(e));
        let backoff_policy = MockBackoffPolicy::new();
        let sleep = MockSleep::new();
        let backoff = async move |d| sleep.sleep(d).await;

        let err = retry_loop(
            inner,
            backoff,
            Arc::new(retry_policy),
            Arc::new(backoff_policy),
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .await
        .unwrap_err();
        assert!(err.is_binding(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn retry_success() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut call = MockCall::new();
        for attempt in 1..=2 {
            call.expect_call()
                .once()
                .in_sequence(&mut seq)
                .withf(move |n| *n == attempt)
                .returning(|_| transient());
        }
        call.expect_call()
            .once()
            .in_sequence(&mut seq)
            .withf(|n| *n == 3)
            .returning(|_| success());
        let inner = async move |n| call.call(n);

        let mut retry_policy = MockRetryPolicy::new();
        retry_policy
            .expect_on_error()
            .times(2)
            .returning(|_, e| RetryResult::Continue(e));
        let mut backoff_policy = MockBackoffPolicy::new();
        backoff_policy
            .expect_on_failure()
            .times(2)
            .returning(|_, n| Duration::from_secs(n as u64));
        let mut sleep = MockSleep::new();
        sleep
            .expect_sleep()
            .times(2)
            .returning(|_| Box::pin(async {}));
        let backoff = async move |d| sleep.sleep(d).await;

        let mut retries = Vec::new();
        let response = retry_loop(
            inner,
            backoff,
            Arc::new(retry_policy),
            Arc::new(backoff_policy),
            &CancellationToken::new(),
            |n, _, d| retries.push((n, d)),
        )
        .await?;
        assert_eq!(response, "success");
        assert_eq!(
            retries,
            vec![(1, Duration::from_secs(1)), (2, Duration::from_secs(2))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn exhausted() -> anyhow::Result<()> {
        const ATTEMPTS: u32 = 5;
        let mut call = MockCall::new();
        call.expect_call()
            .times(ATTEMPTS as usize)
            .returning(|_| transient());
        let inner = async move |n| call.call(n);

        let delays = Arc::new(Mutex::new(Vec::new()));
        let recorded = delays.clone();
        let sleep = async move |d| {
            recorded.lock().expect("never poisoned").push(d);
        };

        let err = retry_loop(
            inner,
            sleep,
            Arc::new(Recommended.with_attempt_limit(ATTEMPTS)),
            Arc::new(crate::backoff_policy::default_block_backoff()),
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .await
        .unwrap_err();
        assert!(err.is_exhausted(), "{err:?}");
        let source = err.source().and_then(|e| e.downcast_ref::<Error>());
        assert!(source.is_some_and(Error::is_block_upload), "{err:?}");

        let got = delays.lock().expect("never poisoned").clone();
        let want = [5, 15, 45, 135].map(Duration::from_secs).to_vec();
        assert_eq!(got, want);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() -> anyhow::Result<()> {
        let call = MockCall::new();
        let inner = async move |n| call.call(n);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = retry_loop(
            inner,
            async |_| {},
            Arc::new(Recommended),
            Arc::new(ConstantBackoff::new(Duration::from_secs(5))),
            &cancel,
            |_, _, _| {},
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled(), "{err:?}");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_backoff() -> anyhow::Result<()> {
        let mut call = MockCall::new();
        call.expect_call().once().returning(|_| transient());
        let inner = async move |n| call.call(n);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let err = retry_loop(
            inner,
            async |d| tokio::time::sleep(d).await,
            Arc::new(Recommended),
            Arc::new(ConstantBackoff::new(Duration::from_secs(3600))),
            &cancel,
            move |_, _, _| trigger.cancel(),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled(), "{err:?}");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_attempt() -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let inner = async move |_| -> Result<String> {
            trigger.cancel();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            success()
        };

        let err = retry_loop(
            inner,
            async |_| {},
            Arc::new(Recommended),
            Arc::new(ConstantBackoff::new(Duration::from_secs(5))),
            &cancel,
            |_, _, _| {},
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled(), "{err:?}");
        Ok(())
    }

    fn success() -> Result<String> {
        Ok("success".into())
    }

    fn transient() -> Result<String> {
        Err(Error::block_upload("try-again"))
    }

    trait Call {
        fn call(&self, attempt_count: u32) -> Result<String>;
    }

    mockall::mock! {
        Call {}
        impl Call for Call {
            fn call(&self, attempt_count: u32) -> Result<String>;
        }
    }

    trait Sleep {
        fn sleep(&self, d: Duration) -> impl Future<Output = ()>;
    }

    mockall::mock! {
        Sleep {}
        impl Sleep for Sleep {
            fn sleep(&self, d: Duration) -> impl Future<Output = ()> + Send;
        }
    }

    mockall::mock! {
        #[derive(Debug)]
        RetryPolicy {}
        impl RetryPolicy for RetryPolicy {
            fn on_error(&self, state: &RetryState, error: Error) -> RetryResult;
        }
    }

    mockall::mock! {
        #[derive(Debug)]
        BackoffPolicy {}
        impl BackoffPolicy for BackoffPolicy {
            fn on_failure(&self, loop_start: std::time::Instant, attempt_count: u32) -> Duration;
        }
    }
}
