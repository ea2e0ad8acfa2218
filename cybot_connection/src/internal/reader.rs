use crate::*;

use tokio::{
    io::{
        AsyncRead,
        AsyncReadExt,
    },
    sync::{
        mpsc::Sender,
        oneshot,
    },
    select,
    time::{
        sleep_until,
        Instant,
    },
};
use std::time::Duration;

/// Longest line accepted from the server, excluding the terminator
pub const MAX_LINE_LEN: usize = 8192;

const READ_CHUNK: usize = 4096;

/// What the reader hands back when it stops
pub struct ReaderExit<R>
{
    pub reader: R,
    /// Bytes read from the socket that did not yet form a complete line
    pub pending: Vec<u8>,
}

/// Reads lines from one half of a connection and forwards them as events.
///
/// The deadline is pushed back every time a complete line arrives; if it passes
/// first, the reader reports [`ConnectionError::IdleTimeout`] and stops.
pub struct ReaderTask<R>
{
    reader: R,
    buffer: Vec<u8>,
    idle_timeout: Duration,
    event_channel: Sender<ConnectionEvent>,
    stop: oneshot::Receiver<()>,
}

impl<R> ReaderTask<R>
    where R: AsyncRead + Unpin
{
    pub fn new(reader: R,
        pending: Vec<u8>,
        idle_timeout: Duration,
        events: Sender<ConnectionEvent>,
        stop: oneshot::Receiver<()>) -> Self
    {
        Self {
            reader,
            buffer: pending,
            idle_timeout,
            event_channel: events,
            stop,
        }
    }

    /// Remove the next complete line from the buffer, if there is one
    fn take_line(&mut self) -> Result<Option<String>, ConnectionError>
    {
        match self.buffer.iter().position(|b| *b == b'\n')
        {
            Some(pos) =>
            {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r')
                {
                    line.pop();
                }
                if line.len() > MAX_LINE_LEN
                {
                    return Err(ConnectionError::InputLineTooLong);
                }
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None if self.buffer.len() > MAX_LINE_LEN => Err(ConnectionError::InputLineTooLong),
            None => Ok(None)
        }
    }

    /// Put a line that could not be delivered back in front of the buffer,
    /// so that it is part of the pending input handed back on exit
    fn unread(&mut self, line: String)
    {
        let mut restored = line.into_bytes();
        restored.extend_from_slice(b"\r\n");
        restored.append(&mut self.buffer);
        self.buffer = restored;
    }

    async fn read_more(&mut self, deadline: Instant) -> Result<bool, ConnectionError>
    {
        let mut chunk = [0u8; READ_CHUNK];
        let idle_timeout = self.idle_timeout;

        select!
        {
            biased;

            _ = &mut self.stop => Ok(false),
            _ = sleep_until(deadline) => Err(ConnectionError::IdleTimeout(idle_timeout)),
            // `read` is cancel safe, so nothing is lost if another branch wins
            read = self.reader.read(&mut chunk) => match read?
            {
                0 => Err(ConnectionError::Closed),
                n => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    Ok(true)
                }
            }
        }
    }

    async fn read_lines(&mut self) -> Result<(), ConnectionError>
    {
        let mut deadline = Instant::now() + self.idle_timeout;

        loop
        {
            while let Some(line) = self.take_line()?
            {
                deadline = Instant::now() + self.idle_timeout;

                if line.is_empty()
                {
                    continue;
                }

                tracing::trace!(?line, "Received");

                // `reserve` is cancel safe, and keeps the line in hand if a stop wins
                let undelivered = {
                    let permit = select!
                    {
                        biased;

                        _ = &mut self.stop => None,
                        permit = self.event_channel.reserve() => match permit
                        {
                            Ok(permit) => Some(permit),
                            // Nobody is listening any more
                            Err(_) => return Ok(()),
                        }
                    };
                    match permit
                    {
                        Some(permit) => {
                            permit.send(ConnectionEvent::Message(line));
                            None
                        }
                        None => Some(line),
                    }
                };
                if let Some(line) = undelivered
                {
                    self.unread(line);
                    return Ok(());
                }
            }

            if !self.read_more(deadline).await?
            {
                return Ok(());
            }
        }
    }

    pub async fn run(mut self) -> ReaderExit<R>
    {
        if let Err(e) = self.read_lines().await
        {
            tracing::debug!("Reader stopping: {}", e);
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

        ReaderExit { reader: self.reader, pending: self.buffer }
    }
}
