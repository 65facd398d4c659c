/// The two deltas every reconciler emits: an entity newly observed, or one
/// that vanished. Members, job-configs, job-records, and tasks each get
/// their own join/remove pair; this crate models that as one `EventBus<T>`
/// per entity kind rather than separate stringly-typed channels, since
/// within a kind the join/remove pair always carries the same payload
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Join,
    Remove,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Join => "join",
            Topic::Remove => "remove",
        }
    }
}
