//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes event destined to the component.
    fn on(&mut self, event: Event);
}

/// Enables the use of pattern matching syntax for processing different types of events
/// by downcasting the event payload from [`EventData`](crate::event::EventData) to user-defined types.
///
/// Match arms need not be exhaustive. However, if the event payload does not match any of specified arms,
/// the macro will log the event as unhandled under `ERROR` level.
///
/// # Examples
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use serde::Serialize;
/// use dcsim_core::{cast, Event, EventHandler, Simulation, SimulationContext};
///
/// #[derive(Clone, Serialize)]
/// pub struct SomeEvent {
///     some_field: u32,
/// }
///
/// pub struct Component {
///     state: u32,
/// }
///
/// impl EventHandler for Component {
///     fn on(&mut self, event: Event) {
///         cast!(match event.data {
///             SomeEvent { some_field } => {
///                 self.state = some_field;
///             }
///         })
///     }
/// }
///
/// let mut sim = Simulation::new(123);
/// let mut client_ctx = sim.create_context("client");
/// let comp = Rc::new(RefCell::new(Component { state: 0 }));
/// let comp_id = sim.add_handler("comp", comp.clone());
/// client_ctx.emit(SomeEvent { some_field: 16 }, comp_id, 1.2);
/// sim.step();
/// assert_eq!(comp.borrow().state, 16);
/// ```
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}
