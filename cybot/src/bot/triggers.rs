use crate::Trigger;

/// Answers server `PING`s. Runs inline so the `PONG` is queued before
/// anything a slower trigger might send.
pub(super) fn keepalive() -> Trigger {
    Trigger::new(
        "keepalive",
        |m| m.is("PING"),
        |bot, message| async move {
            match message.last_param() {
                Some(token) => bot.send(format!("PONG :{}", token)).await,
                None => bot.send("PONG").await,
            }
            true
        },
    )
    .inline()
}

/// Joins the configured channels once registration completes. Twitch sends
/// both `001` and the end of the MOTD; only the first to arrive has any
/// effect.
pub(super) fn join_channels() -> Trigger {
    Trigger::new(
        "join-channels",
        |m| m.is("001") || m.is("376"),
        |bot, _| async move {
            bot.join_configured_channels().await;
            true
        },
    )
}
