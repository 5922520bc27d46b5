//! # knot-hooks
//!
//! Typed, named hook points for the knot compiler pipeline.
//!
//! A hook is a list of named handlers ("taps") invoked in registration
//! order. There is one hook type per invocation discipline, and the set is
//! closed - plugins never dispatch dynamically, they register typed handlers
//! on the hook objects a host exposes:
//!
//! - [`SyncSeriesHook`] - every handler runs, in order.
//! - [`SyncBailHook`] - first handler returning `Some` short-circuits.
//! - [`SyncWaterfallHook`] - each handler transforms the value for the next.
//! - [`AsyncSeriesHook`] - handlers awaited one after another; the first
//!   error short-circuits the chain.
//! - [`AsyncParallelHook`] - handlers run as a fan-out; the call resolves
//!   once all handlers settle, reporting the first observed error.
//!
//! Hosts group hooks into plain structs (`CompilerHooks`, etc.) so the full
//! surface is visible in one place.
//!
//! ```
//! use knot_hooks::SyncSeriesHook;
//!
//! let mut hook: SyncSeriesHook<Vec<&'static str>> = SyncSeriesHook::default();
//! hook.tap("first", |log| log.push("first"));
//! hook.tap("second", |log| log.push("second"));
//!
//! let mut log = Vec::new();
//! hook.call(&mut log);
//! assert_eq!(log, ["first", "second"]);
//! ```

use futures::future::BoxFuture;

/// Error type carried by async hook chains.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of an async hook handler.
pub type HookResult = Result<(), BoxError>;

/// A registered handler together with the name it was tapped under.
///
/// Names exist for diagnostics only; invocation order is registration order.
struct Tap<F> {
    name: &'static str,
    handler: F,
}

macro_rules! common_hook_methods {
    () => {
        /// Number of registered handlers.
        pub fn len(&self) -> usize {
            self.taps.len()
        }

        /// True when no handler has been registered.
        pub fn is_empty(&self) -> bool {
            self.taps.is_empty()
        }

        /// Names of all registered handlers, in invocation order.
        pub fn tap_names(&self) -> impl Iterator<Item = &'static str> + '_ {
            self.taps.iter().map(|t| t.name)
        }
    };
}

type SyncSeriesFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// All handlers run, in registration order.
pub struct SyncSeriesHook<T> {
    taps: Vec<Tap<SyncSeriesFn<T>>>,
}

impl<T> Default for SyncSeriesHook<T> {
    fn default() -> Self {
        Self { taps: Vec::new() }
    }
}

impl<T> SyncSeriesHook<T> {
    common_hook_methods!();

    pub fn tap(&mut self, name: &'static str, handler: impl Fn(&mut T) + Send + Sync + 'static) {
        self.taps.push(Tap {
            name,
            handler: Box::new(handler),
        });
    }

    pub fn call(&self, arg: &mut T) {
        for tap in &self.taps {
            (tap.handler)(arg);
        }
    }
}

type SyncBailFn<T, R> = Box<dyn Fn(&T) -> Option<R> + Send + Sync>;

/// Handlers run in order until one returns `Some`, which becomes the call's
/// result. Returns `None` when every handler declined.
pub struct SyncBailHook<T, R> {
    taps: Vec<Tap<SyncBailFn<T, R>>>,
}

impl<T, R> Default for SyncBailHook<T, R> {
    fn default() -> Self {
        Self { taps: Vec::new() }
    }
}

impl<T, R> SyncBailHook<T, R> {
    common_hook_methods!();

    pub fn tap(
        &mut self,
        name: &'static str,
        handler: impl Fn(&T) -> Option<R> + Send + Sync + 'static,
    ) {
        self.taps.push(Tap {
            name,
            handler: Box::new(handler),
        });
    }

    pub fn call(&self, arg: &T) -> Option<R> {
        for tap in &self.taps {
            if let Some(result) = (tap.handler)(arg) {
                return Some(result);
            }
        }
        None
    }
}

type SyncWaterfallFn<T> = Box<dyn Fn(T) -> T + Send + Sync>;

/// Each handler receives the previous handler's return value.
pub struct SyncWaterfallHook<T> {
    taps: Vec<Tap<SyncWaterfallFn<T>>>,
}

impl<T> Default for SyncWaterfallHook<T> {
    fn default() -> Self {
        Self { taps: Vec::new() }
    }
}

impl<T> SyncWaterfallHook<T> {
    common_hook_methods!();

    pub fn tap(&mut self, name: &'static str, handler: impl Fn(T) -> T + Send + Sync + 'static) {
        self.taps.push(Tap {
            name,
            handler: Box::new(handler),
        });
    }

    pub fn call(&self, mut arg: T) -> T {
        for tap in &self.taps {
            arg = (tap.handler)(arg);
        }
        arg
    }
}

type AsyncSeriesFn<T> = Box<dyn for<'a> Fn(&'a mut T) -> BoxFuture<'a, HookResult> + Send + Sync>;

/// Handlers awaited one after another; the first error short-circuits.
pub struct AsyncSeriesHook<T> {
    taps: Vec<Tap<AsyncSeriesFn<T>>>,
}

impl<T> Default for AsyncSeriesHook<T> {
    fn default() -> Self {
        Self { taps: Vec::new() }
    }
}

impl<T> AsyncSeriesHook<T> {
    common_hook_methods!();

    pub fn tap(
        &mut self,
        name: &'static str,
        handler: impl for<'a> Fn(&'a mut T) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    ) {
        self.taps.push(Tap {
            name,
            handler: Box::new(handler),
        });
    }

    pub async fn call(&self, arg: &mut T) -> HookResult {
        for tap in &self.taps {
            (tap.handler)(arg).await?;
        }
        Ok(())
    }
}

type AsyncParallelFn<T> = Box<dyn for<'a> Fn(&'a T) -> BoxFuture<'a, HookResult> + Send + Sync>;

/// Handlers started as a fan-out over a shared reference. The call resolves
/// once every handler has settled; if any failed, the first error (in
/// registration order) is returned.
pub struct AsyncParallelHook<T> {
    taps: Vec<Tap<AsyncParallelFn<T>>>,
}

impl<T> Default for AsyncParallelHook<T> {
    fn default() -> Self {
        Self { taps: Vec::new() }
    }
}

impl<T: Sync> AsyncParallelHook<T> {
    common_hook_methods!();

    pub fn tap(
        &mut self,
        name: &'static str,
        handler: impl for<'a> Fn(&'a T) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    ) {
        self.taps.push(Tap {
            name,
            handler: Box::new(handler),
        });
    }

    pub async fn call(&self, arg: &T) -> HookResult {
        let futures: Vec<_> = self.taps.iter().map(|tap| (tap.handler)(arg)).collect();
        let results = futures::future::join_all(futures).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn sync_series_runs_in_registration_order() {
        let mut hook: SyncSeriesHook<Vec<u32>> = SyncSeriesHook::default();
        hook.tap("one", |v| v.push(1));
        hook.tap("two", |v| v.push(2));
        hook.tap("three", |v| v.push(3));

        let mut seen = Vec::new();
        hook.call(&mut seen);
        assert_eq!(seen, [1, 2, 3]);
        assert_eq!(hook.tap_names().collect::<Vec<_>>(), ["one", "two", "three"]);
    }

    #[test]
    fn sync_bail_short_circuits_on_first_some() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut hook: SyncBailHook<u32, &'static str> = SyncBailHook::default();
        hook.tap("declines", |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            None
        });
        hook.tap("answers", |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Some("hit")
        });
        hook.tap("never-reached", |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Some("shadowed")
        });

        assert_eq!(hook.call(&0), Some("hit"));
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sync_waterfall_threads_the_value() {
        let mut hook: SyncWaterfallHook<String> = SyncWaterfallHook::default();
        hook.tap("suffix-a", |s| s + "a");
        hook.tap("suffix-b", |s| s + "b");

        assert_eq!(hook.call(String::from("_")), "_ab");
    }

    #[tokio::test]
    async fn async_series_stops_at_first_error() {
        type Log = Vec<&'static str>;
        let mut hook: AsyncSeriesHook<Log> = AsyncSeriesHook::default();
        hook.tap("ok", |log: &mut Log| -> BoxFuture<'_, HookResult> {
            Box::pin(async move {
                log.push("ok");
                Ok(())
            })
        });
        hook.tap("fails", |log: &mut Log| -> BoxFuture<'_, HookResult> {
            Box::pin(async move {
                log.push("fails");
                Err("boom".into())
            })
        });
        hook.tap("skipped", |log: &mut Log| -> BoxFuture<'_, HookResult> {
            Box::pin(async move {
                log.push("skipped");
                Ok(())
            })
        });

        let mut log = Vec::new();
        let err = hook.call(&mut log).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(log, ["ok", "fails"]);
    }

    #[tokio::test]
    async fn async_parallel_settles_all_and_reports_first_error() {
        type Log = Mutex<Vec<&'static str>>;
        let log: Log = Mutex::new(Vec::new());

        let mut hook: AsyncParallelHook<Log> = AsyncParallelHook::default();
        hook.tap("first-error", |log: &Log| -> BoxFuture<'_, HookResult> {
            Box::pin(async move {
                log.lock().unwrap().push("first-error");
                Err("first".into())
            })
        });
        hook.tap("second-error", |log: &Log| -> BoxFuture<'_, HookResult> {
            Box::pin(async move {
                log.lock().unwrap().push("second-error");
                Err("second".into())
            })
        });
        hook.tap("still-runs", |log: &Log| -> BoxFuture<'_, HookResult> {
            Box::pin(async move {
                log.lock().unwrap().push("still-runs");
                Ok(())
            })
        });

        let err = hook.call(&log).await.unwrap_err();
        assert_eq!(err.to_string(), "first");
        // All handlers settled even though two failed.
        assert_eq!(log.lock().unwrap().len(), 3);
    }
}
