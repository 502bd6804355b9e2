use std::collections::HashMap;

use tracing::trace;

use super::events::{DataCategory, MyoEvent};
use crate::error::HandlerError;

/// Callback receiving decoded events of one category.
pub type EventHandler = Box<dyn FnMut(&MyoEvent) -> Result<(), HandlerError> + Send>;

/// Ordered event handlers per data category.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<DataCategory, Vec<EventHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .handlers
            .iter()
            .map(|(category, handlers)| (category, handlers.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to `category`.
    pub fn add<F>(&mut self, category: DataCategory, handler: F)
    where
        F: FnMut(&MyoEvent) -> Result<(), HandlerError> + Send + 'static,
    {
        self.handlers
            .entry(category)
            .or_default()
            .push(Box::new(handler));
    }

    /// Removes the handler at `index`, returning it if it existed.
    pub fn pop(&mut self, category: DataCategory, index: usize) -> Option<EventHandler> {
        let handlers = self.handlers.get_mut(&category)?;
        (index < handlers.len()).then(|| handlers.remove(index))
    }

    /// Removes the most recently added handler of `category`.
    pub fn pop_last(&mut self, category: DataCategory) -> Option<EventHandler> {
        self.handlers.get_mut(&category)?.pop()
    }

    /// Removes every handler of `category`.
    pub fn clear(&mut self, category: DataCategory) {
        self.handlers.remove(&category);
    }

    /// Removes every handler.
    pub fn clear_all(&mut self) {
        self.handlers.clear();
    }

    /// Number of handlers registered for `category`.
    #[must_use]
    pub fn len(&self, category: DataCategory) -> usize {
        self.handlers.get(&category).map_or(0, Vec::len)
    }

    /// Returns whether no handler is registered in any category.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }

    /// Invokes the handlers of the event's category in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure; later handlers are not invoked.
    pub fn dispatch(&mut self, event: &MyoEvent) -> Result<(), HandlerError> {
        let Some(handlers) = self.handlers.get_mut(&event.category()) else {
            trace!(category = %event.category(), "no handlers registered");
            return Ok(());
        };
        for handler in handlers {
            handler(event)?;
        }
        Ok(())
    }
}
