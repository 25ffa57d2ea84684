pub mod key_combo;
pub mod key_name_to_vk;

pub use key_combo::{KeyCombo, Modifier};
pub use key_name_to_vk::KeyNameToVk;
