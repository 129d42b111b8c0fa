use rand::Rng;
use std::collections::VecDeque;
use tracing::debug;

use crate::audio::{error::PlayerError, track::Track};

/// Cola FIFO acotada de un guild.
#[derive(Debug, Clone)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Appends a batch of tracks, all or nothing.
    ///
    /// A batch that would push the queue past `max_size` is rejected with
    /// [`PlayerError::QueueFull`] and the queue is left untouched.
    pub fn enqueue(&mut self, tracks: Vec<Track>) -> Result<usize, PlayerError> {
        if self.items.len() + tracks.len() > self.max_size {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        let added = tracks.len();
        self.items.extend(tracks);
        debug!("➕ {} canciones agregadas, {} en cola", added, self.items.len());
        Ok(added)
    }

    /// Inserta al frente sin validar capacidad (reintentos y "play N").
    pub fn push_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Moves the entry at `index` (0-based) to the front. Returns `false` when out of range.
    pub fn move_to_front(&mut self, index: usize) -> bool {
        match self.items.remove(index) {
            Some(track) => {
                self.items.push_front(track);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        cleared
    }

    /// Fisher–Yates in place.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let slice = self.items.make_contiguous();
        for i in (1..slice.len()).rev() {
            let j = rng.gen_range(0..=i);
            slice.swap(i, j);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn front(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }
}

/// Recently played tracks, oldest evicted first.
#[derive(Debug, Clone)]
pub struct History {
    items: VecDeque<Track>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, track: Track) {
        if self.capacity == 0 {
            return;
        }
        // Mantener solo los últimos N items
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(track);
    }

    /// Pops the most recently played track.
    pub fn pop_latest(&mut self) -> Option<Track> {
        self.items.pop_back()
    }

    pub fn latest(&self) -> Option<&Track> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
