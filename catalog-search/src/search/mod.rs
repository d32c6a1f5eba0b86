//! Product search: semantic, keyword and the router that picks between them

pub mod events;
pub mod keyword;
pub mod router;
pub mod semantic;

pub use events::{LoggingEventPublisher, SearchContext, SearchEvent, SearchEventPublisher};
pub use keyword::KeywordSearchEngine;
pub use router::SearchRouter;
pub use semantic::SemanticSearchEngine;
