//! These models represent the objects passed around by the agent
//!
//! The conversation is kept in a backend-neutral form (`message`), tools are
//! described with `tool::ToolSpec` and requested with `tool::ToolCall`. Each
//! provider adapter converts these into its own wire format and back, so the
//! internal models are not an exact match to any vendor format.
pub mod message;
pub mod role;
pub mod tool;
