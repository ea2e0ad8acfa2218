use super::*;

/// The hand-off used when session hijacking is off: there is never a
/// predecessor, and no rendezvous point is opened, so every run dials afresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColdReconnect;

#[async_trait]
impl SessionHandoff for ColdReconnect {
    async fn inherit(&self) -> Result<Option<InheritedSession>, HandoffError> {
        Ok(None)
    }

    fn listen(&self) -> Result<Option<Box<dyn HandoffListener>>, HandoffError> {
        Ok(None)
    }
}
