pub mod buffer;
pub mod hits;
pub mod skill;
