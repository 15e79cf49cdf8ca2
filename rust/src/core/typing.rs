// Local typing signal emitter. Timers are owned by the actor; this only tracks
// which timer generation is still allowed to fire.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingSignal {
    Started { room_id: String },
    Stopped { room_id: String },
}

#[derive(Debug, Default)]
pub struct TypingCoordinator {
    room_id: Option<String>,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingInput {
    pub signals: Vec<TypingSignal>,
    /// Generation the idle timer must carry when it fires.
    pub timer_generation: u64,
}

impl TypingCoordinator {
    pub fn is_typing(&self) -> bool {
        self.room_id.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every input re-announces typing and restarts the idle timer.
    pub fn on_input(&mut self, room_id: &str) -> TypingInput {
        let mut signals = Vec::with_capacity(2);
        if let Some(prev) = self.room_id.take() {
            if prev != room_id {
                signals.push(TypingSignal::Stopped { room_id: prev });
            }
        }
        self.room_id = Some(room_id.to_string());
        signals.push(TypingSignal::Started {
            room_id: room_id.to_string(),
        });
        self.generation = self.generation.wrapping_add(1);
        TypingInput {
            signals,
            timer_generation: self.generation,
        }
    }

    /// Idle timer expiry. Superseded generations are ignored.
    pub fn on_timer(&mut self, generation: u64) -> Option<TypingSignal> {
        if generation != self.generation {
            return None;
        }
        self.room_id
            .take()
            .map(|room_id| TypingSignal::Stopped { room_id })
    }

    /// Room switch or send: stop right away and cancel any pending timer.
    pub fn stop(&mut self) -> Option<TypingSignal> {
        self.generation = self.generation.wrapping_add(1);
        self.room_id
            .take()
            .map(|room_id| TypingSignal::Stopped { room_id })
    }
}
