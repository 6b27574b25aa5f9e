use ferroid::id::ULID;

/// Source of fresh film IDs.
///
/// The store asks for a new ID on every create and retries on collision, so an
/// implementation only has to make collisions unlikely, not impossible.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Generates Crockford Base32 ULIDs from the wall clock and thread-local
/// randomness.
#[derive(Clone, Copy, Debug, Default)]
pub struct UlidSource;

impl IdSource for UlidSource {
    fn next_id(&self) -> String {
        ULID::now().to_string()
    }
}
