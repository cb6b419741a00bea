//! Shared test constants

pub const MODEL_ID: &str = "model-ava";
pub const MODEL_NAME: &str = "Ava";

/// Every fake embedding has this many dimensions.
pub const EMBEDDING_DIMS: usize = 4;

/// Openers handed out by the scripted hook stage, in order.
pub const HOOK_OPENERS: &[&str] = &[
    "I need a man who stays",
    "Nobody warned me about this",
    "Be honest with me right now",
    "My therapist would hate this story",
    "You ever text someone first",
    "Here is my hot take on",
    "Tell me why I stayed",
    "I have a confession about",
];
