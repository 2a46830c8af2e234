//! Priority-ordered hook chain in front of a terminal request handler.
//!
//! The pipeline is owned by the host (typically the code that starts an
//! auction). Participants such as the consent gate register a [`Hook`] under
//! a name and priority; every [`Pipeline::invoke`] walks the hooks from the
//! highest priority down and finally hands the input to the terminal handler.
//!
//! A hook resumes the chain through [`Next::run`], which consumes the
//! continuation. Dropping the [`Next`] instead abandons the request.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

/// Boxed future returned by [`Next::run`].
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A participant in a [`Pipeline`].
#[async_trait]
pub trait Hook<R: Send + 'static>: Send + Sync {
    /// Handles `input`, then either runs `next` once or drops it.
    async fn call(&self, input: R, next: Next<R>);
}

type Terminal<R> = Arc<dyn Fn(R) + Send + Sync>;

struct HookEntry<R> {
    name: String,
    priority: i32,
    hook: Arc<dyn Hook<R>>,
}

impl<R> Clone for HookEntry<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            hook: Arc::clone(&self.hook),
        }
    }
}

/// Continuation handed to a hook: the rest of the chain.
pub struct Next<R> {
    hooks: Arc<[HookEntry<R>]>,
    index: usize,
    terminal: Terminal<R>,
}

impl<R: Send + 'static> Next<R> {
    /// Resumes the pipeline with `input`.
    pub fn run(self, input: R) -> BoxFuture<()> {
        Box::pin(async move {
            let Some(entry) = self.hooks.get(self.index).cloned() else {
                (self.terminal)(input);
                return;
            };
            let next = Self {
                hooks: self.hooks,
                index: self.index + 1,
                terminal: self.terminal,
            };
            entry.hook.call(input, next).await;
        })
    }
}

/// Hook chain ending in a terminal handler.
pub struct Pipeline<R> {
    hooks: RwLock<Vec<HookEntry<R>>>,
    terminal: Terminal<R>,
}

impl<R: Send + 'static> Pipeline<R> {
    /// Creates a pipeline without hooks around `terminal`.
    pub fn new<F>(terminal: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        Self {
            hooks: RwLock::new(Vec::new()),
            terminal: Arc::new(terminal),
        }
    }

    /// Registers `hook` under `name`, replacing a previous hook of that name.
    ///
    /// Higher priorities run first; equal priorities keep registration order.
    pub fn add_hook(&self, name: &str, priority: i32, hook: Arc<dyn Hook<R>>) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks.retain(|entry| entry.name != name);
        let position = hooks
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(hooks.len());
        hooks.insert(
            position,
            HookEntry {
                name: name.to_string(),
                priority,
                hook,
            },
        );
    }

    /// Removes the hook registered under `name`. Returns whether one existed.
    pub fn remove_hook(&self, name: &str) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|entry| entry.name != name);
        hooks.len() != before
    }

    /// Names of the registered hooks in execution order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Runs `input` through the hooks and the terminal handler.
    ///
    /// Resolves once the chain finished or a hook abandoned the request.
    pub async fn invoke(&self, input: R) {
        let hooks: Arc<[HookEntry<R>]> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        let next = Next {
            hooks,
            index: 0,
            terminal: Arc::clone(&self.terminal),
        };
        next.run(input).await;
    }
}
