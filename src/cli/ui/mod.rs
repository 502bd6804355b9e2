mod event_view;
mod painter;
mod session_view;
mod table;

pub(crate) use self::event_view::EventView;
pub(crate) use self::painter::Painter;
pub(crate) use self::session_view::{ConnectionView, StopView};
