use super::ChannelEvent;
use mixer_types::{FileTransferParams, FileTransferState, MixerError, MixerResult};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

const REASON_NONE: u32 = 0;
const REASON_REQUESTED: u32 = 1;
const REASON_LOCAL_STOPPED: u32 = 2;

struct TransferState {
    state: FileTransferState,
    initial_offset: u64,
}

/// File transfer bookkeeping. Moving the bytes is somebody else's job.
pub struct FileTransferChannel {
    params: FileTransferParams,
    outgoing: bool,
    inner: Mutex<TransferState>,
    events: broadcast::Sender<ChannelEvent>,
}

impl FileTransferChannel {
    pub(super) fn new(
        params: FileTransferParams,
        outgoing: bool,
        events: broadcast::Sender<ChannelEvent>,
    ) -> Self {
        let initial_offset = params.initial_offset;
        Self {
            params,
            outgoing,
            inner: Mutex::new(TransferState {
                state: FileTransferState::Pending,
                initial_offset,
            }),
            events,
        }
    }

    pub fn params(&self) -> &FileTransferParams {
        &self.params
    }

    pub fn is_outgoing(&self) -> bool {
        self.outgoing
    }

    pub fn state(&self) -> FileTransferState {
        self.inner.lock().state
    }

    pub fn initial_offset(&self) -> u64 {
        self.inner.lock().initial_offset
    }

    /// Accept an incoming file, resuming from `offset`.
    pub fn accept(&self, offset: u64) -> MixerResult<()> {
        if self.outgoing {
            return Err(MixerError::NotAvailable(
                "cannot accept a file we are sending".into(),
            ));
        }
        let mut inner = self.inner.lock();
        self.require_state(&inner, &[FileTransferState::Pending], "accept")?;
        inner.initial_offset = offset.min(self.params.size);
        let _ = self
            .events
            .send(ChannelEvent::InitialOffsetDefined(inner.initial_offset));
        self.transition(&mut inner, FileTransferState::Accepted, REASON_REQUESTED);
        Ok(())
    }

    /// Offer an outgoing file. The transfer starts from the beginning.
    pub fn provide(&self) -> MixerResult<()> {
        if !self.outgoing {
            return Err(MixerError::NotAvailable(
                "cannot provide a file we are receiving".into(),
            ));
        }
        let mut inner = self.inner.lock();
        self.require_state(
            &inner,
            &[FileTransferState::Pending, FileTransferState::Accepted],
            "provide",
        )?;
        inner.initial_offset = 0;
        let _ = self.events.send(ChannelEvent::InitialOffsetDefined(0));
        self.transition(&mut inner, FileTransferState::Open, REASON_REQUESTED);
        Ok(())
    }

    /// The data connection for an accepted incoming file is up.
    pub fn open(&self) -> MixerResult<()> {
        let mut inner = self.inner.lock();
        self.require_state(&inner, &[FileTransferState::Accepted], "open")?;
        self.transition(&mut inner, FileTransferState::Open, REASON_NONE);
        Ok(())
    }

    pub fn complete(&self) -> MixerResult<()> {
        let mut inner = self.inner.lock();
        self.require_state(&inner, &[FileTransferState::Open], "complete")?;
        self.transition(&mut inner, FileTransferState::Completed, REASON_NONE);
        Ok(())
    }

    pub fn cancel(&self) -> MixerResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return Err(MixerError::NotAvailable(format!(
                "transfer already {:?}",
                inner.state
            )));
        }
        self.transition(&mut inner, FileTransferState::Cancelled, REASON_LOCAL_STOPPED);
        Ok(())
    }

    fn require_state(
        &self,
        inner: &TransferState,
        allowed: &[FileTransferState],
        action: &str,
    ) -> MixerResult<()> {
        if allowed.contains(&inner.state) {
            Ok(())
        } else {
            Err(MixerError::NotAvailable(format!(
                "cannot {} a transfer in state {:?}",
                action, inner.state
            )))
        }
    }

    fn transition(&self, inner: &mut TransferState, state: FileTransferState, reason: u32) {
        debug!(file = %self.params.filename, from = ?inner.state, to = ?state, "File transfer state changed");
        inner.state = state;
        let _ = self
            .events
            .send(ChannelEvent::FileTransferStateChanged { state, reason });
    }
}
