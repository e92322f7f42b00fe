pub mod optimize;
pub mod size;
pub mod time;
pub mod write;
