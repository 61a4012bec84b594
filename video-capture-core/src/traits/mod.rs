pub mod canvas;
pub mod frame_encoder;
pub mod frame_source;
pub mod muxer;
pub mod session_delegate;
