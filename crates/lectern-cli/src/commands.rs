//! Subcommand handlers.

use lectern_common::{LecternError, RoomId};
use lectern_live::protocol::events;
use lectern_live::{
    AuxiliaryChannelMux, ChatMessage, LiveConfig, SignalingChannel, WhiteboardEvent,
    WhiteboardMirror,
};
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_message(msg: &ChatMessage) {
    println!("[{}] {}", msg.received_at.format("%H:%M:%S"), msg.text);
}

/// Join `room`, print its backlog, then relay stdin lines and inbound
/// messages until stdin closes.
pub async fn chat(
    channel: &SignalingChannel,
    live: &LiveConfig,
    room: RoomId,
) -> Result<(), LecternError> {
    let mux = AuxiliaryChannelMux::new(channel.scoped(), live.auxiliary.clone());
    let (backlog, mut inbound) = mux.enter_chat(&room).await?;
    backlog.iter().for_each(print_message);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            msg = inbound.recv() => match msg {
                Some(msg) => print_message(&msg),
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => mux.send_chat(line.trim(), &room).await?,
                None => break,
            },
        }
    }

    mux.shutdown();
    Ok(())
}

pub async fn history(
    channel: &SignalingChannel,
    live: &LiveConfig,
    room: RoomId,
) -> Result<(), LecternError> {
    let mux = AuxiliaryChannelMux::new(channel.scoped(), live.auxiliary.clone());
    let messages = mux.fetch_history_default(&room).await?;
    if messages.is_empty() {
        println!("No messages in room {room}");
    }
    messages.iter().for_each(print_message);
    mux.shutdown();
    Ok(())
}

/// Mirror the room's whiteboard and print each change as JSON. Producer
/// announcements are logged.
pub async fn watch(
    channel: &SignalingChannel,
    live: &LiveConfig,
    room: RoomId,
) -> Result<(), LecternError> {
    let scoped = channel.scoped();
    let mux = AuxiliaryChannelMux::new(scoped.clone(), live.auxiliary.clone());
    let mut board = mux.on_whiteboard().await?;
    let mut producers = scoped.listen(events::NEW_PRODUCER).await?;
    mux.join_room(&room).await?;
    mux.request_whiteboard_replay(&room).await?;

    let mut mirror = WhiteboardMirror::default();
    loop {
        tokio::select! {
            frame = producers.recv() => match frame {
                Some(_) => tracing::info!(%room, "Teacher started publishing"),
                None => break,
            },
            event = board.recv() => {
                let Some(event) = event else { break };
                let closed = matches!(event, WhiteboardEvent::Closed);
                mirror.apply(event);
                if closed {
                    println!("Whiteboard closed");
                    continue;
                }
                let elements = serde_json::to_string(mirror.elements())
                    .map_err(|e| LecternError::Other(e.to_string()))?;
                println!("{elements}");
            }
        }
    }

    mux.shutdown();
    Ok(())
}
