//! Chat commands the `cybot` binary registers. Each is an ordinary
//! [`Trigger`]; use [`sample`] as a template when adding new ones.

use cybot::{Bot, Message, Trigger};
use std::time::Duration;

/// Gap between the two halves of the `-long` reply
pub const LONG_REPLY_DELAY: Duration = Duration::from_secs(5);

fn is_command(message: &Message, command: &str) -> bool {
    message.is("PRIVMSG") && message.content() == command
}

/// `!sample`: replies with "sample"
pub fn sample() -> Trigger {
    Trigger::new(
        "sample",
        |m| is_command(m, "!sample"),
        |bot, message| async move {
            bot.reply(&message, "sample").await;
            true
        },
    )
}

/// `-long`: replies twice, with a pause in between. Runs as its own task so
/// the pause holds up nothing else.
pub fn long() -> Trigger {
    long_with_delay(LONG_REPLY_DELAY)
}

fn long_with_delay(delay: Duration) -> Trigger {
    Trigger::new(
        "long",
        |m| is_command(m, "-long"),
        move |bot, message| async move {
            bot.reply(&message, "This is the first message").await;
            tokio::time::sleep(delay).await;
            bot.reply(&message, "This is the second message").await;
            true
        },
    )
}

/// Says hello back to anyone who says hello
pub fn hello() -> Trigger {
    Trigger::new(
        "hello",
        |m| m.is("PRIVMSG") && m.content().eq_ignore_ascii_case("hello"),
        |bot, message| async move {
            let name = message.tags().display_name().unwrap_or(message.from());
            let greeting = format!(
                "Hello {} and welcome to the home of {}!",
                name,
                home_channel(&bot, &message)
            );
            bot.reply(&message, &greeting).await;
            true
        },
    )
}

/// `!uptime`: how long the bot has been running
pub fn uptime() -> Trigger {
    Trigger::new(
        "uptime",
        |m| is_command(m, "!uptime"),
        |bot, message| async move {
            let text = format!(
                "I've been awake for {}, please let me sleep...",
                bot.uptime_string()
            );
            bot.reply(&message, &text).await;
            true
        },
    )
}

/// The channel a message was sent in, without its `#`, or the bot's own
/// name for private messages
fn home_channel(bot: &Bot, message: &Message) -> String {
    match message.to().strip_prefix('#') {
        Some(channel) => channel.to_string(),
        None => bot.nick(),
    }
}

/// Every command the binary ships with
pub fn all() -> Vec<Trigger> {
    vec![sample(), long(), hello(), uptime()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cybot::BotConfig;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
        net::{tcp::OwnedReadHalf, tcp::OwnedWriteHalf, TcpListener},
        time::timeout,
    };

    const PATIENCE: Duration = Duration::from_secs(5);

    struct Harness {
        bot: Arc<Bot>,
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Harness {
        /// A registered bot with `trigger` added, talking to a loopback server
        async fn start(trigger: Trigger) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let mut config = BotConfig::new(listener.local_addr().unwrap().to_string(), "cybot");
            config.throttle_delay_ms = 1;

            let bot = Bot::new(config);
            bot.add_trigger(trigger);
            let runner = Arc::clone(&bot);
            tokio::spawn(async move { runner.run().await });

            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, writer) = stream.into_split();
            let mut harness = Self { bot, lines: BufReader::new(read_half).lines(), writer };

            // USER, NICK, CAP
            for _ in 0..3 {
                harness.next_line().await;
            }
            harness
        }

        async fn say(&mut self, text: &str) {
            let line = format!(
                "@display-name=Viewer :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #cyborgshadow :{}\r\n",
                text
            );
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn next_line(&mut self) -> String {
            timeout(PATIENCE, self.lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        }

        /// Confirm nothing else was sent before a PING's answer
        async fn expect_nothing_more(&mut self) {
            self.writer.write_all(b"PING :check\r\n").await.unwrap();
            assert_eq!(self.next_line().await, "PONG :check");
        }
    }

    #[tokio::test]
    async fn sample_replies_in_channel() {
        let mut harness = Harness::start(sample()).await;

        harness.say("!not-sample").await;
        harness.expect_nothing_more().await;

        harness.say("!sample").await;
        assert_eq!(harness.next_line().await, "PRIVMSG #cyborgshadow :sample");
        harness.bot.stop();
    }

    #[tokio::test]
    async fn hello_uses_display_name() {
        let mut harness = Harness::start(hello()).await;

        harness.say("HeLLo").await;
        assert_eq!(
            harness.next_line().await,
            "PRIVMSG #cyborgshadow :Hello Viewer and welcome to the home of cyborgshadow!"
        );
        harness.bot.stop();
    }

    #[tokio::test]
    async fn uptime_reports_duration() {
        let mut harness = Harness::start(uptime()).await;

        harness.say("!uptime").await;
        let line = harness.next_line().await;
        assert!(line.starts_with("PRIVMSG #cyborgshadow :I've been awake for "));
        assert!(line.ends_with("s, please let me sleep..."));
        harness.bot.stop();
    }

    #[tokio::test]
    async fn long_reply_does_not_block_others() {
        let mut harness = Harness::start(long_with_delay(Duration::from_millis(300))).await;

        harness.say("-long").await;
        assert_eq!(harness.next_line().await, "PRIVMSG #cyborgshadow :This is the first message");

        // Still answering while the long command sleeps
        harness.expect_nothing_more().await;
        assert_eq!(harness.next_line().await, "PRIVMSG #cyborgshadow :This is the second message");
        harness.bot.stop();
    }

    #[test]
    fn all_commands_are_named() {
        let names: Vec<_> = all().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["sample", "long", "hello", "uptime"]);
    }
}
