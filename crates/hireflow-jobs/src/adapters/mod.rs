//! Resume text extractors.

pub mod pdf_text;
pub mod text_native;

pub use pdf_text::PdfTextExtractor;
pub use text_native::TextNativeExtractor;
