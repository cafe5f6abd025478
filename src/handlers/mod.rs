pub mod asr;
pub mod response;

pub use asr::recognize_upload;
