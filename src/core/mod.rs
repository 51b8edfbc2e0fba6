pub mod assembler;
pub mod extractor;
pub mod processor;
pub mod router;
pub mod search;
pub mod synonyms;
