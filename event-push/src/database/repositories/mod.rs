pub mod topic_binding;

pub use topic_binding::{SqlxTopicBindingRepository, TopicBindingRepository};
