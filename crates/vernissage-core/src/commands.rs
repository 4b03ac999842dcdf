mod happening_ops;
mod io_and_views;
mod modifiers;
mod prelude;
mod report;

pub use prelude::{
  dispatch,
  expand_command_abbrev,
  known_command_names
};
