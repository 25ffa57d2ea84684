mod classifier;
mod recognizer;

pub use classifier::classify;
pub use recognizer::{GestureRecognizer, GestureSettings};
