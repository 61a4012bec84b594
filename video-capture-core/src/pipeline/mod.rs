pub mod encoder_slot;
pub mod frame_gate;
pub mod frame_pump;
pub mod render;
