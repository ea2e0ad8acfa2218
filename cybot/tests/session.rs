mod utils;

use cybot::{Bot, BotError, ConnectionError, RunOutcome, SessionState, Trigger};
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle, time::timeout};
use utils::*;

fn start(bot: &Arc<Bot>) -> JoinHandle<Result<RunOutcome, BotError>> {
    let bot = Arc::clone(bot);
    tokio::spawn(async move { bot.run().await })
}

async fn finish(run: JoinHandle<Result<RunOutcome, BotError>>) -> Result<RunOutcome, BotError> {
    timeout(PATIENCE, run)
        .await
        .expect("bot didn't stop")
        .unwrap()
}

async fn explode(reason: &'static str) -> bool {
    panic!("{}", reason)
}

#[tokio::test]
async fn registers_and_joins_once() {
    let server = FakeServer::bind().await;
    let mut config = test_config(&server);
    config.password = Some("oauth:abc123".to_string());
    let bot = Bot::new(config);
    let run = start(&bot);

    let mut client = server.accept().await;
    client.expect("PASS oauth:abc123").await;
    client.expect_registration("cybot").await;
    assert_eq!(bot.state(), SessionState::Registering);

    client.send(":tmi.twitch.tv 001 cybot :Welcome, GLHF!").await;
    client.send(":tmi.twitch.tv 376 cybot :>").await;
    client.send(":tmi.twitch.tv 001 cybot :Welcome, GLHF!").await;
    client.expect("JOIN #one").await;
    client.expect("JOIN #two key").await;

    client.send("PING :tmi.twitch.tv").await;
    client.expect("PONG :tmi.twitch.tv").await;
    assert_eq!(bot.state(), SessionState::Running);

    // Give any duplicate JOIN time to be written
    tokio::time::sleep(Duration::from_millis(200)).await;

    bot.stop();
    assert!(matches!(finish(run).await.unwrap(), RunOutcome::Stopped));
    assert_eq!(client.remaining_lines().await, Vec::<String>::new());
    assert_eq!(bot.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn keepalive_answers_each_ping_once() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));
    let run = start(&bot);

    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    client.send("PING :tmi.twitch.tv").await;
    client.expect("PONG :tmi.twitch.tv").await;
    client.send("PING tmi.twitch.tv").await;
    client.expect("PONG :tmi.twitch.tv").await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    bot.stop();
    finish(run).await.unwrap();
    assert_eq!(client.remaining_lines().await, Vec::<String>::new());
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));
    let mut incoming = bot.subscribe();
    let run = start(&bot);

    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    client.send("@badges=;color=#FF0000").await;
    client.send("   ").await;
    client.send(":lonely.prefix").await;
    client.send("@display-name=Foo :foo!foo@foo.tmi.twitch.tv PRIVMSG #one :still here").await;
    client.send("PING :after").await;
    client.expect("PONG :after").await;

    let first = incoming.recv().await.unwrap();
    assert_eq!(first.command(), "PRIVMSG");
    assert_eq!(first.tags().display_name(), Some("Foo"));
    assert_eq!(first.content(), "still here");

    let second = incoming.recv().await.unwrap();
    assert_eq!(second.command(), "PING");

    bot.stop();
    finish(run).await.unwrap();
}

#[tokio::test]
async fn silence_ends_the_session() {
    let server = FakeServer::bind().await;
    let mut config = test_config(&server);
    config.ping_timeout_ms = 300;
    let bot = Bot::new(config);
    let mut incoming = bot.subscribe();
    let run = start(&bot);

    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    let outcome = finish(run).await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Disconnected(Some(ConnectionError::IdleTimeout(_)))
    ));

    assert!(matches!(incoming.recv().await, Err(RecvError::Closed)));
    assert_eq!(client.remaining_lines().await, Vec::<String>::new());
}

#[tokio::test]
async fn server_close_ends_session_and_run_can_restart() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect_registration("cybot").await;
    client.send(":tmi.twitch.tv 001 cybot :Welcome").await;
    client.expect("JOIN #one").await;
    client.expect("JOIN #two key").await;
    drop(client);

    let outcome = finish(run).await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Disconnected(Some(ConnectionError::Closed))
    ));
    assert!(!bot.is_running());

    // A new session registers and joins from scratch
    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect_registration("cybot").await;
    client.send(":tmi.twitch.tv 001 cybot :Welcome").await;
    client.expect("JOIN #one").await;
    client.expect("JOIN #two key").await;

    bot.stop();
    finish(run).await.unwrap();
}

#[tokio::test]
async fn panicking_triggers_do_not_stop_the_bot() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));

    bot.add_trigger(Trigger::new(
        "boom",
        |m| m.content() == "!boom",
        |_, _| explode("spawned trigger failed"),
    ));
    bot.add_trigger(
        Trigger::new(
            "inline-boom",
            |m| m.content() == "!boom",
            |_, _| explode("inline trigger failed"),
        )
        .inline(),
    );
    bot.add_trigger(Trigger::new(
        "picky",
        |m| m.params()[5].is_empty(),
        |_, _| async { true },
    ));

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    client.send(":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #one :!boom").await;
    client.send("PING :survived").await;
    client.expect("PONG :survived").await;
    assert!(bot.is_running());

    bot.stop();
    assert!(matches!(finish(run).await.unwrap(), RunOutcome::Stopped));
}

#[tokio::test]
async fn long_replies_are_split() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));
    let body = "x".repeat(900);

    let reply = body.clone();
    bot.add_trigger(Trigger::new(
        "long",
        |m| m.is("PRIVMSG") && m.content() == "!long",
        move |bot, message| {
            let reply = reply.clone();
            async move {
                bot.reply(&message, &reply).await;
                true
            }
        },
    ));

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    client.send(":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #one :!long").await;
    let mut rebuilt = String::new();
    for _ in 0..3 {
        let line = client.next_line().await.unwrap();
        let piece = line.strip_prefix("PRIVMSG #one :").unwrap();
        assert!(piece.len() <= 400);
        rebuilt.push_str(piece);
    }
    assert_eq!(rebuilt, body);

    bot.stop();
    finish(run).await.unwrap();
}

#[tokio::test]
async fn dial_failure_is_returned() {
    let address = {
        let server = FakeServer::bind().await;
        server.address()
    };
    let bot = Bot::new(cybot::BotConfig::new(address, "cybot"));

    assert!(matches!(bot.run().await, Err(BotError::Dial { .. })));
    assert!(!bot.is_running());
    assert_eq!(bot.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn only_one_run_at_a_time() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));
    let run = start(&bot);

    let mut client = server.accept().await;
    client.expect_registration("cybot").await;
    assert!(matches!(bot.run().await, Err(BotError::AlreadyRunning)));

    bot.stop();
    finish(run).await.unwrap();
}

#[tokio::test]
async fn stop_is_prompt_on_a_busy_channel() {
    let server = FakeServer::bind().await;
    let bot = Bot::new(test_config(&server));
    bot.add_trigger(
        Trigger::new(
            "slow",
            |m| m.is("PRIVMSG"),
            |_, _| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                true
            },
        )
        .inline(),
    );

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    let backlog: String = (0..300)
        .map(|i| format!(":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #one :{}\r\n", i))
        .collect();
    client.send_raw(&backlog).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Far less than the six seconds the backlog would take to dispatch
    bot.stop();
    assert!(matches!(finish(run).await.unwrap(), RunOutcome::Stopped));
    assert!(!bot.is_running());
}

#[tokio::test]
async fn lines_sent_between_sessions_do_not_precede_registration() {
    let server = FakeServer::bind().await;
    let mut config = test_config(&server);
    config.password = Some("oauth:x".to_string());
    let bot = Bot::new(config);

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect("PASS oauth:x").await;
    client.expect_registration("cybot").await;
    drop(client);
    finish(run).await.unwrap();

    // A trigger that outlived its session
    bot.send("PRIVMSG #one :This is the second message").await;

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect("PASS oauth:x").await;
    client.expect_registration("cybot").await;
    client.send("PING :next").await;
    client.expect("PONG :next").await;

    bot.stop();
    finish(run).await.unwrap();
    assert_eq!(client.remaining_lines().await, Vec::<String>::new());
}

#[tokio::test]
async fn write_failure_with_a_full_queue_ends_the_session() {
    let server = FakeServer::bind().await;
    let mut config = test_config(&server);
    config.throttle_delay_ms = 300;
    let bot = Bot::new(config);

    let run = start(&bot);
    let mut client = server.accept().await;
    client.expect_registration("cybot").await;

    // Keep the outbound queue full
    let filler = Arc::clone(&bot);
    tokio::spawn(async move {
        for i in 0..64 {
            filler.send(format!("PRIVMSG #one :{}", i)).await;
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The keepalive now waits for room in the queue
    client.send("PING :stuck").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.reset();

    let outcome = finish(run).await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Disconnected(Some(ConnectionError::IoError(_)))
    ));
    assert!(!bot.is_running());
}
