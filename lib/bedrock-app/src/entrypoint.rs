use std::process::ExitCode;

use bedrock_core::{
    Builder, CancellationToken, DefaultRunner, Lifecycle, NotifyOnSignal, PostRunHooks, RecoverPanics, Runner as _,
    Runtime,
};
use tracing::{error, info};

/// Creates the standard runner stack.
///
/// Panics anywhere in the stack are recovered, the context is cancelled on `SIGINT` or `SIGTERM`, and the post-run
/// hooks of `lifecycle` run once the component has stopped.
pub fn default_runner(lifecycle: Lifecycle) -> RecoverPanics<NotifyOnSignal<PostRunHooks<DefaultRunner>>> {
    RecoverPanics::new(NotifyOnSignal::with_default_signals(PostRunHooks::new(
        DefaultRunner,
        lifecycle,
    )))
}

/// Builds and runs the main component of a process.
///
/// The component is run with [`default_runner`]. When it stops cleanly, a successful exit code is returned. Otherwise,
/// the error is logged and a failing exit code is returned.
pub async fn run_main<T, B>(builder: B, lifecycle: Lifecycle) -> ExitCode
where
    T: Runtime,
    B: Builder<T>,
{
    let runner = default_runner(lifecycle);
    let builder: &dyn Builder<T> = &builder;

    match runner.run(&CancellationToken::new(), builder).await {
        Ok(()) => {
            info!("Stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Stopped with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use bedrock_core::{builder_fn, runtime_fn};
    use bedrock_error::{generic_error, GenericError};

    use super::*;
    use crate::telemetry::{with_telemetry, TelemetryProvider};

    #[derive(Default)]
    struct CountingProvider {
        initialized: Arc<AtomicUsize>,
        shut_down: Arc<AtomicUsize>,
        fail_init: bool,
    }

    #[async_trait]
    impl TelemetryProvider for CountingProvider {
        async fn initialize(&self, _ctx: &CancellationToken) -> Result<(), GenericError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(generic_error!("exporter unreachable"));
            }
            Ok(())
        }

        async fn shutdown(&self, _ctx: &CancellationToken) -> Result<(), GenericError> {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Succeeds;

    #[async_trait]
    impl Runtime for Succeeds {
        async fn run(self, _ctx: CancellationToken) -> Result<(), GenericError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn clean_stop_is_success() {
        let builder = builder_fn(|_ctx| async { Ok(Succeeds) });
        assert_eq!(run_main(builder, Lifecycle::new()).await, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn runtime_error_is_failure() {
        let builder = builder_fn(|_ctx| async {
            Ok(runtime_fn(|_ctx: CancellationToken| async { Err(generic_error!("database unreachable")) }))
        });
        assert_eq!(run_main(builder, Lifecycle::new()).await, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn panic_is_failure() {
        let builder = builder_fn(|_ctx| async {
            Ok(runtime_fn(|_ctx: CancellationToken| async {
                if true {
                    panic!("component exploded");
                }
                Ok(())
            }))
        });
        assert_eq!(run_main(builder, Lifecycle::new()).await, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn telemetry_is_shut_down_after_run() {
        let provider = CountingProvider::default();
        let initialized = Arc::clone(&provider.initialized);
        let shut_down = Arc::clone(&provider.shut_down);

        let lifecycle = Lifecycle::new();
        let builder = with_telemetry(builder_fn(|_ctx| async { Ok(Succeeds) }), provider, lifecycle.clone());

        assert_eq!(run_main(builder, lifecycle).await, ExitCode::SUCCESS);
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(shut_down.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_telemetry_initialization_prevents_build() {
        let provider = CountingProvider {
            fail_init: true,
            ..Default::default()
        };
        let shut_down = Arc::clone(&provider.shut_down);
        let built = Arc::new(AtomicUsize::new(0));

        let lifecycle = Lifecycle::new();
        let build_count = Arc::clone(&built);
        let builder = with_telemetry(
            builder_fn(move |_ctx| {
                build_count.fetch_add(1, Ordering::SeqCst);
                async { Ok(Succeeds) }
            }),
            provider,
            lifecycle.clone(),
        );

        assert_eq!(run_main(builder, lifecycle).await, ExitCode::FAILURE);
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(shut_down.load(Ordering::SeqCst), 0);
    }
}
