#![allow(dead_code)]

use cybot::BotConfig;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener,
    },
    time::timeout,
};

/// How long any single expectation may take before the test fails
pub const PATIENCE: Duration = Duration::from_secs(5);

/// A loopback stand-in for the chat server
pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn address(&self) -> String {
        self.listener.local_addr().unwrap().to_string()
    }

    pub async fn accept(&self) -> FakeClient {
        let (stream, _) = timeout(PATIENCE, self.listener.accept())
            .await
            .expect("bot didn't connect")
            .unwrap();
        let (read_half, write_half) = stream.into_split();

        FakeClient {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        }
    }
}

/// The server's side of one bot connection
pub struct FakeClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl FakeClient {
    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Write bytes exactly as given, with no terminator added
    pub async fn send_raw(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
    }

    /// The next line from the bot, or `None` if it closed the connection
    pub async fn next_line(&mut self) -> Option<String> {
        timeout(PATIENCE, self.lines.next_line())
            .await
            .expect("timed out waiting for the bot")
            .unwrap()
    }

    pub async fn expect(&mut self, expected: &str) {
        let line = self.next_line().await;
        assert_eq!(line.as_deref(), Some(expected));
    }

    /// Read the registration sequence for a bot with no password
    pub async fn expect_registration(&mut self, nick: &str) {
        self.expect(&format!("USER {} 8 * :{}", nick, nick)).await;
        self.expect(&format!("NICK {}", nick)).await;
        self.expect("CAP REQ :twitch.tv/tags twitch.tv/commands").await;
    }

    /// Abort the connection, so that the bot's next write fails
    pub fn reset(self) {
        let read_half = self.lines.into_inner().into_inner();
        let stream = read_half.reunite(self.writer).unwrap();
        stream.set_linger(Some(Duration::ZERO)).unwrap();
    }

    /// Everything the bot sends until it closes the connection
    pub async fn remaining_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line);
        }
        lines
    }
}

/// Wait for a file to be removed, failing the test if it takes too long
pub async fn wait_for_removal(path: &std::path::Path) {
    timeout(PATIENCE, async {
        while path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("file was not removed");
}

pub fn test_config(server: &FakeServer) -> BotConfig {
    let mut config = BotConfig::new(server.address(), "cybot");
    config.channels = vec!["#one".to_string(), "#two:key".to_string()];
    config.throttle_delay_ms = 1;
    config
}
