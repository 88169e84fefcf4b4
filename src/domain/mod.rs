pub mod canonical;
pub mod mapping;
pub mod playback;
pub mod survey;
