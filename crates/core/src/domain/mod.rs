pub mod member;
pub mod topic;
