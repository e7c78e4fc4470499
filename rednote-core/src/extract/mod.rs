pub mod models;
pub mod pipeline;
pub mod url;

pub use models::{parse_count, ExtractedComment, ExtractedNote};
pub use pipeline::NoteExtractor;
pub use url::{extract_note_url, is_note_permalink, ShareLinkParser};
