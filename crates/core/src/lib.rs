pub mod config;
pub mod domain;
pub mod errors;
pub mod graph;
pub mod suggestions;

pub use domain::member::CommunityMember;
pub use domain::topic::{normalize_topic, RelationshipKind, TopicRelationship};
pub use errors::{ApplicationError, DomainError, InterfaceError, LookupFailure};
pub use graph::{GraphError, TopicGraph};
pub use suggestions::{
    CooldownStats, CooldownStore, SuggestionEngine, SuggestionError, SuggestionOutcome,
    SuggestionRequest, TopicMatch,
};
