//! Minimal PDF object model: enough to read an existing document, locate its
//! pages and signature fields, and write it back with new objects.

pub mod document;
pub mod filters;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod serializer;
pub mod writer;
pub mod xref;

pub use document::{PdfDocument, SignatureField};
pub use object::{Dict, Object, ObjectRef};
pub use serializer::ObjectSerializer;
pub use writer::{DocumentUpdate, FullRewriteWriter, IncrementalWriter, WrittenDocument};
