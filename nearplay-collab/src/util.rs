use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Generates a lowercase identifier for a new session document.
pub fn random_session_id(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric).to_ascii_lowercase() as char)
        .take(length)
        .collect()
}
