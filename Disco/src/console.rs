//! Line-oriented command console on stdin.
//!
//! Stands in for the chat command layer: every line is one command applied
//! to the current destination.

use std::sync::Arc;

use anyhow::Result;
use discoplay::{MusicPlayer, PlayerError, PlayerEvent, ResolveRequest, TrackOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::logs::LogControl;

const REQUESTER: &str = "console";
const CHANNEL: &str = "stdin";

const HELP: &str = "\
commands:
  join [destination]      connect and make it the current destination
  leave                   disconnect the current destination
  play <query>            resolve and enqueue (joins if needed)
  playlist <q1> <q2> ...  enqueue several queries, skipping failures
  pause | resume | skip | stop
  volume <0-111>
  np | queue | status
  loglevel [LEVEL]
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(Option<String>),
    Leave,
    Play(String),
    Playlist(Vec<String>),
    Pause,
    Resume,
    Skip,
    Stop,
    Volume(i64),
    NowPlaying,
    Queue,
    Status,
    LogLevel(Option<String>),
    Help,
    Quit,
}

impl Command {
    /// Parses one console line. `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_lowercase().as_str() {
            "join" => Command::Join((!rest.is_empty()).then(|| rest.to_string())),
            "leave" => Command::Leave,
            "play" | "p" => {
                if rest.is_empty() {
                    return Err("usage: play <query>".into());
                }
                Command::Play(rest.to_string())
            }
            "playlist" => {
                let queries: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
                if queries.is_empty() {
                    return Err("usage: playlist <q1> <q2> ...".into());
                }
                Command::Playlist(queries)
            }
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "skip" | "next" => Command::Skip,
            "stop" => Command::Stop,
            "volume" | "vol" => {
                let value = rest
                    .parse::<i64>()
                    .map_err(|_| format!("volume expects a number, got {:?}", rest))?;
                Command::Volume(value)
            }
            "np" | "nowplaying" => Command::NowPlaying,
            "queue" | "q" => Command::Queue,
            "status" => Command::Status,
            "loglevel" => Command::LogLevel((!rest.is_empty()).then(|| rest.to_string())),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command {:?}, try help", other)),
        };
        Ok(Some(command))
    }
}

pub struct Console {
    player: Arc<MusicPlayer>,
    logs: LogControl,
    destination: String,
}

impl Console {
    pub fn new(player: Arc<MusicPlayer>, logs: LogControl, destination: impl Into<String>) -> Self {
        Self {
            player,
            logs,
            destination: destination.into(),
        }
    }

    /// Reads commands until `quit` or end of input.
    pub async fn run(mut self) -> Result<()> {
        let printer = spawn_event_printer(self.player.subscribe());
        println!("disco ready on destination {:?}, type help", self.destination);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match Command::parse(&line) {
                Ok(None) => {}
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = self.execute(command).await {
                        println!("error: {}", e);
                    }
                }
                Err(message) => println!("{}", message),
            }
        }

        printer.abort();
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<(), PlayerError> {
        if let Command::Join(target) = command {
            if let Some(target) = target {
                self.destination = target;
            }
            self.player.join(&self.destination).await?;
            println!("joined {}", self.destination);
            return Ok(());
        }

        let player = &self.player;
        let destination = self.destination.as_str();
        match command {
            Command::Join(_) | Command::Quit => {}
            Command::Leave => {
                player.leave(destination).await?;
                println!("left {}", destination);
            }
            Command::Play(query) => {
                let request = ResolveRequest::new(query).requested_by(REQUESTER, CHANNEL);
                let track = player.play(destination, &request).await?;
                println!("queued {}", track);
            }
            Command::Playlist(queries) => {
                let requests: Vec<_> = queries
                    .into_iter()
                    .map(|q| ResolveRequest::new(q).requested_by(REQUESTER, CHANNEL))
                    .collect();
                let tracks = player.enqueue_all(destination, &requests).await?;
                println!("queued {} of {} entries", tracks.len(), requests.len());
            }
            Command::Pause => {
                if !player.pause(destination).await? {
                    println!("nothing is playing");
                }
            }
            Command::Resume => {
                if !player.resume(destination).await? {
                    println!("not paused");
                }
            }
            Command::Skip => {
                if player.skip(destination).await? {
                    println!("playback is paused, resume before skipping");
                }
            }
            Command::Stop => player.stop(destination).await?,
            Command::Volume(percent) => {
                let volume = player.set_volume(destination, percent).await?;
                println!("volume {} (applies from the next track)", volume);
            }
            Command::NowPlaying => match player.now_playing(destination).await? {
                Some(track) => println!("now playing {} [{}]", track, track.requester()),
                None => println!("nothing is playing"),
            },
            Command::Queue => {
                let queue = player.queue(destination).await?;
                if queue.is_empty() {
                    println!("queue is empty");
                }
                for (i, track) in queue.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, track);
                }
            }
            Command::Status => {
                let snapshot = player.snapshot(destination).await?;
                println!(
                    "{}: {}, {} queued, volume {}",
                    destination,
                    snapshot.state,
                    snapshot.queue.len(),
                    snapshot.volume
                );
            }
            Command::LogLevel(None) => match self.logs.level() {
                Some(filter) => println!("log level {}", filter),
                None => println!("log level unknown"),
            },
            Command::LogLevel(Some(level)) => match self.logs.set_level(&level) {
                Ok(filter) => println!("log level {}", filter),
                Err(e) => println!("{}", e),
            },
            Command::Help => println!("{}", HELP),
        }
        Ok(())
    }
}

fn spawn_event_printer(mut events: broadcast::Receiver<PlayerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PlayerEvent::TrackStarted {
                    destination,
                    track,
                    tier,
                }) => println!("[{}] ▶ {} ({})", destination, track, tier),
                Ok(PlayerEvent::TrackEnded {
                    destination,
                    track,
                    outcome,
                }) => match outcome {
                    TrackOutcome::Finished => println!("[{}] ■ {}", destination, track),
                    TrackOutcome::Interrupted => println!("[{}] ⏭ {}", destination, track),
                    TrackOutcome::AcquisitionFailed(e) | TrackOutcome::Failed(e) => {
                        println!("[{}] ✗ {}: {}", destination, track, e)
                    }
                },
                Ok(PlayerEvent::Idle { destination }) => println!("[{}] idle", destination),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Event printer lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Ok(None));
        assert_eq!(
            Command::parse("play https://media.example/a.webm"),
            Ok(Some(Command::Play("https://media.example/a.webm".into())))
        );
        assert_eq!(
            Command::parse("playlist a b  c"),
            Ok(Some(Command::Playlist(vec!["a".into(), "b".into(), "c".into()])))
        );
        assert_eq!(Command::parse("JOIN"), Ok(Some(Command::Join(None))));
        assert_eq!(
            Command::parse("join guild-2"),
            Ok(Some(Command::Join(Some("guild-2".into()))))
        );
        assert_eq!(Command::parse("vol 111"), Ok(Some(Command::Volume(111))));
        assert_eq!(Command::parse("loglevel"), Ok(Some(Command::LogLevel(None))));
        assert_eq!(
            Command::parse("loglevel debug"),
            Ok(Some(Command::LogLevel(Some("debug".into()))))
        );
        assert_eq!(Command::parse("volume -4"), Ok(Some(Command::Volume(-4))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("play").is_err());
        assert!(Command::parse("volume loud").is_err());
        assert!(Command::parse("dance").is_err());
    }
}
