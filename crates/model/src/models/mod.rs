pub mod chunk_index;
pub mod event;
pub mod recording;
pub mod template;
