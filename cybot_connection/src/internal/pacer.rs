use crate::*;

use tokio::{
    io::{
        AsyncWrite,
        AsyncWriteExt,
    },
    sync::{
        mpsc::{
            Receiver,
            Sender,
        },
        oneshot,
    },
    select,
    time::sleep,
};
use std::time::Duration;

/// What the pacer hands back when it stops
pub struct PacerExit<W>
{
    pub writer: W,
    /// The outbound queue, including anything not yet written
    pub queue: Receiver<String>,
    /// Set if the pacer stopped because writing failed. The queue has then
    /// been closed, so that senders fail rather than wait for a writer that
    /// is gone.
    pub failed: bool,
}

/// The single writer for a connection.
///
/// Takes one line at a time from the outbound queue, writes it with a CRLF
/// terminator, then waits `throttle` before taking the next one. Writes are
/// therefore never closer together than the throttle interval.
pub struct PacerTask<W>
{
    writer: W,
    queue: Receiver<String>,
    throttle: Duration,
    event_channel: Sender<ConnectionEvent>,
    stop: oneshot::Receiver<()>,
}

/// Cut a queued item down to a single protocol line
fn single_line(line: &str) -> &str
{
    match line.find(|c: char| c == '\r' || c == '\n')
    {
        Some(pos) => {
            tracing::warn!(?line, "Dropping text after embedded line break");
            &line[..pos]
        }
        None => line
    }
}

impl<W> PacerTask<W>
    where W: AsyncWrite + Unpin
{
    pub fn new(writer: W,
        queue: Receiver<String>,
        throttle: Duration,
        events: Sender<ConnectionEvent>,
        stop: oneshot::Receiver<()>) -> Self
    {
        Self {
            writer,
            queue,
            throttle,
            event_channel: events,
            stop,
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError>
    {
        let line = single_line(line);
        tracing::trace!(?line, "Sending");

        let mut frame = String::with_capacity(line.len() + 2);
        frame.push_str(line);
        frame.push_str("\r\n");

        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_lines(&mut self) -> Result<(), ConnectionError>
    {
        loop
        {
            // `recv` is cancel safe: a line is either taken here or left in the queue
            let line = select!
            {
                biased;

                _ = &mut self.stop => return Ok(()),
                line = self.queue.recv() => match line
                {
                    Some(line) => line,
                    None => return Err(ConnectionError::SendQueueClosed),
                }
            };

            self.write_line(&line).await?;

            select!
            {
                biased;

                _ = &mut self.stop => return Ok(()),
                _ = sleep(self.throttle) => ()
            }
        }
    }

    pub async fn run(mut self) -> PacerExit<W>
    {
        let result = self.send_lines().await;
        let failed = result.is_err();

        if let Err(e) = result
        {
            tracing::error!("Pacer stopping: {}", e);
            self.queue.close();

            select!
            {
                biased;

                _ = &mut self.stop => (),
                sent = self.event_channel.send(ConnectionEvent::Error(e)) => if sent.is_err()
                {
                    tracing::error!("Error notifying connection failure");
                }
            }
        }

        PacerExit { writer: self.writer, queue: self.queue, failed }
    }
}
