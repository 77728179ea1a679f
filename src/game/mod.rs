pub mod bubble;
pub mod constants;
pub mod engine;
pub mod input_buffer;
pub mod kinematics;
pub mod player;
pub mod population;
pub mod snapshot;
pub mod store;
