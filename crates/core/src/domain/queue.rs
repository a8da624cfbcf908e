// Queue Domain Model

/// Queue identifier (case-sensitive)
pub type QueueId = String;

/// Validate a queue name before it is used as a registry or store key
pub fn validate_queue_name(name: &str) -> super::error::Result<()> {
    if name.trim().is_empty() {
        return Err(super::DomainError::EmptyQueueName);
    }
    Ok(())
}
