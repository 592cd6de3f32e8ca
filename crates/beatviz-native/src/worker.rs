//! Background threads for everything that touches the network.
//!
//! The UI thread sends [`Job`]s and drains [`Reply`]s once per frame. Jobs
//! run on one of three lanes so a slow analysis fetch or a large preview
//! download never holds up player polls. Replies for a track carry the
//! [`LoadTicket`] the job was issued under, and jobs whose ticket is older
//! than the loaded track are dropped before they hit the network.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use beatviz_core::catalog::{AudioFeatures, PlayerState, Track, UserProfile};
use beatviz_core::{BeatSchedule, LoadTicket, Result};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use web_time::Instant;

use crate::client::ApiClient;

#[derive(Debug)]
pub enum Job {
    Search { query: String, limit: u32 },
    Profile,
    Beats { ticket: LoadTicket },
    Features { ticket: LoadTicket },
    Preview { ticket: LoadTicket, url: String },
    StartRemote { uri: String },
    PollPlayer { ticket: LoadTicket },
    Resume,
    Pause,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lane {
    /// Search, profile, analysis and features
    Api,
    /// Remote player commands and position polls
    Player,
    /// Preview clip downloads
    Media,
}

impl Job {
    fn ticket(&self) -> Option<&LoadTicket> {
        match self {
            Job::Beats { ticket }
            | Job::Features { ticket }
            | Job::Preview { ticket, .. }
            | Job::PollPlayer { ticket } => Some(ticket),
            _ => None,
        }
    }

    fn lane(&self) -> Lane {
        match self {
            Job::Search { .. } | Job::Profile | Job::Beats { .. } | Job::Features { .. } => {
                Lane::Api
            }
            Job::StartRemote { .. } | Job::PollPlayer { .. } | Job::Resume | Job::Pause => {
                Lane::Player
            }
            Job::Preview { .. } => Lane::Media,
        }
    }
}

#[derive(Debug)]
pub enum Reply {
    SearchResults(Result<Vec<Track>>),
    Profile(Result<UserProfile>),
    Beats {
        ticket: LoadTicket,
        result: Result<BeatSchedule>,
    },
    Features {
        ticket: LoadTicket,
        result: Result<AudioFeatures>,
    },
    Preview {
        ticket: LoadTicket,
        result: Result<Vec<u8>>,
    },
    Player {
        ticket: LoadTicket,
        result: Result<Option<PlayerState>>,
        captured_at: Instant,
    },
    Remote(Result<()>),
}

/// Generation of the track the UI has loaded, shared with every lane.
#[derive(Clone, Debug, Default)]
struct LoadedGeneration(Arc<AtomicU64>);

impl LoadedGeneration {
    fn set(&self, generation: u64) {
        self.0.store(generation, Ordering::Relaxed);
    }

    fn is_stale(&self, job: &Job) -> bool {
        job.ticket()
            .is_some_and(|t| t.generation < self.0.load(Ordering::Relaxed))
    }
}

pub struct Worker {
    api: Sender<Job>,
    player: Sender<Job>,
    media: Sender<Job>,
    replies: Receiver<Reply>,
    loaded: LoadedGeneration,
    _handles: Vec<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(client: ApiClient) -> std::io::Result<Self> {
        let client = Arc::new(client);
        let loaded = LoadedGeneration::default();
        let (reply_tx, replies) = channel::unbounded::<Reply>();

        let mut handles = Vec::with_capacity(3);
        let mut lane = |name: &str| -> std::io::Result<Sender<Job>> {
            let (jobs, job_rx) = channel::unbounded::<Job>();
            let client = client.clone();
            let reply_tx = reply_tx.clone();
            let loaded = loaded.clone();
            let handle = thread::Builder::new()
                .name(format!("beatviz-{name}"))
                .spawn(move || run(&client, &job_rx, &reply_tx, &loaded))?;
            handles.push(handle);
            Ok(jobs)
        };
        let api = lane("api")?;
        let player = lane("player")?;
        let media = lane("media")?;

        Ok(Self {
            api,
            player,
            media,
            replies,
            loaded,
            _handles: handles,
        })
    }

    /// Jobs issued under older tickets are skipped from now on.
    pub fn track_loaded(&self, ticket: &LoadTicket) {
        self.loaded.set(ticket.generation);
    }

    pub fn send(&self, job: Job) {
        let lane = match job.lane() {
            Lane::Api => &self.api,
            Lane::Player => &self.player,
            Lane::Media => &self.media,
        };
        if let Err(e) = lane.send(job) {
            log::error!("network worker is gone, dropped {:?}", e.into_inner());
        }
    }

    /// Everything that finished since the last call.
    pub fn drain(&self) -> Vec<Reply> {
        let mut out = Vec::new();
        loop {
            match self.replies.try_recv() {
                Ok(reply) => out.push(reply),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::error!("network worker stopped");
                    break;
                }
            }
        }
        out
    }
}

fn run(
    client: &ApiClient,
    jobs: &Receiver<Job>,
    replies: &Sender<Reply>,
    loaded: &LoadedGeneration,
) {
    for job in jobs {
        if loaded.is_stale(&job) {
            log::debug!("skipping stale {job:?}");
            continue;
        }
        log::debug!("worker: {job:?}");
        let reply = handle(client, job);
        if replies.send(reply).is_err() {
            break;
        }
    }
    log::debug!("{} exiting", thread::current().name().unwrap_or("worker"));
}

fn handle(client: &ApiClient, job: Job) -> Reply {
    match job {
        Job::Search { query, limit } => Reply::SearchResults(client.search(&query, limit)),
        Job::Profile => Reply::Profile(client.me()),
        Job::Beats { ticket } => {
            let result = client.beat_schedule(&ticket.track_id);
            Reply::Beats { ticket, result }
        }
        Job::Features { ticket } => {
            let result = client.audio_features(&ticket.track_id);
            Reply::Features { ticket, result }
        }
        Job::Preview { ticket, url } => {
            let result = client.download(&url);
            Reply::Preview { ticket, result }
        }
        Job::StartRemote { uri } => Reply::Remote(client.start_playback(&uri)),
        Job::PollPlayer { ticket } => {
            let result = client.player_state();
            Reply::Player {
                ticket,
                result,
                captured_at: Instant::now(),
            }
        }
        Job::Resume => Reply::Remote(client.resume()),
        Job::Pause => Reply::Remote(client.pause()),
    }
}
