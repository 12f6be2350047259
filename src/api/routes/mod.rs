pub mod dataset;
pub mod item;
pub mod result;
pub mod stage;
pub mod zone;
