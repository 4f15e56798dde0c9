use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteState {
    Up,
    Down,
    #[default]
    None,
}

impl VoteState {
    /// Wire value sent with the vote request.
    pub fn direction(self) -> i32 {
        match self {
            VoteState::Up => 1,
            VoteState::Down => -1,
            VoteState::None => 0,
        }
    }

    pub fn from_likes(likes: Option<bool>) -> Self {
        match likes {
            Some(true) => VoteState::Up,
            Some(false) => VoteState::Down,
            None => VoteState::None,
        }
    }

    pub fn likes(self) -> Option<bool> {
        match self {
            VoteState::Up => Some(true),
            VoteState::Down => Some(false),
            VoteState::None => None,
        }
    }
}

/// Which arrow was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
}

impl Arrow {
    fn target(self) -> VoteState {
        match self {
            Arrow::Up => VoteState::Up,
            Arrow::Down => VoteState::Down,
        }
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arrow::Up => f.write_str("upvote"),
            Arrow::Down => f.write_str("downvote"),
        }
    }
}

/// Clicking the active arrow clears the vote; clicking the other arrow flips
/// it in one step.
pub fn transition(state: VoteState, arrow: Arrow) -> (VoteState, i64) {
    let requested = if state == arrow.target() {
        VoteState::None
    } else {
        arrow.target()
    };
    let delta = i64::from(requested.direction() - state.direction());
    (requested, delta)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    #[error("a previous change is still being sent")]
    InFlight,
}

/// An optimistic vote that has been applied locally and still needs the
/// remote acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingVote {
    pub previous: VoteState,
    pub requested: VoteState,
    pub delta: i64,
}

impl PendingVote {
    pub fn direction(&self) -> i32 {
        self.requested.direction()
    }
}

/// Vote state paired with the score it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Votable {
    state: VoteState,
    score: i64,
    in_flight: bool,
}

impl Votable {
    pub fn new(score: i64, state: VoteState) -> Self {
        Self {
            state,
            score,
            in_flight: false,
        }
    }

    pub fn state(&self) -> VoteState {
        self.state
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn click(&mut self, arrow: Arrow) -> Result<PendingVote, VoteError> {
        if self.in_flight {
            return Err(VoteError::InFlight);
        }
        let previous = self.state;
        let (requested, delta) = transition(previous, arrow);
        self.state = requested;
        self.score += delta;
        self.in_flight = true;
        Ok(PendingVote {
            previous,
            requested,
            delta,
        })
    }

    /// Clears the in-flight flag. A failed request puts the previous state
    /// and score back; returns whether that happened.
    pub fn settle(&mut self, pending: &PendingVote, succeeded: bool) -> bool {
        self.in_flight = false;
        if succeeded || self.state != pending.requested {
            return false;
        }
        self.state = pending.previous;
        self.score -= pending.delta;
        tracing::debug!(
            restored = ?pending.previous,
            score = self.score,
            "reverted vote after failed request"
        );
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveToggle {
    saved: bool,
    in_flight: bool,
}

impl SaveToggle {
    pub fn new(saved: bool) -> Self {
        Self {
            saved,
            in_flight: false,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Flips the flag optimistically and returns the requested value.
    pub fn toggle(&mut self) -> Result<bool, VoteError> {
        if self.in_flight {
            return Err(VoteError::InFlight);
        }
        self.saved = !self.saved;
        self.in_flight = true;
        Ok(self.saved)
    }

    pub fn settle(&mut self, requested: bool, succeeded: bool) -> bool {
        self.in_flight = false;
        if succeeded || self.saved != requested {
            return false;
        }
        self.saved = !requested;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use Arrow::*;
        use VoteState as S;
        assert_eq!(transition(S::None, Up), (S::Up, 1));
        assert_eq!(transition(S::None, Down), (S::Down, -1));
        assert_eq!(transition(S::Up, Up), (S::None, -1));
        assert_eq!(transition(S::Down, Down), (S::None, 1));
        assert_eq!(transition(S::Up, Down), (S::Down, -2));
        assert_eq!(transition(S::Down, Up), (S::Up, 2));
    }

    #[test]
    fn switching_up_to_down_moves_score_by_two() {
        let mut item = Votable::new(10, VoteState::None);
        let first = item.click(Arrow::Up).unwrap();
        item.settle(&first, true);
        assert_eq!(item.score(), 11);

        // The switch itself is -2; against the unvoted score of 10 the
        // item ends one point lower.
        let second = item.click(Arrow::Down).unwrap();
        assert_eq!(second.delta, -2);
        assert_eq!(second.direction(), -1);
        item.settle(&second, true);
        assert_eq!(item.state(), VoteState::Down);
        assert_eq!(item.score(), 9);
    }

    #[test]
    fn clicks_are_serialised_per_item() {
        let mut item = Votable::new(3, VoteState::None);
        let pending = item.click(Arrow::Up).unwrap();
        assert!(item.is_in_flight());
        assert_eq!(item.click(Arrow::Down), Err(VoteError::InFlight));
        assert_eq!(item.score(), 4);
        item.settle(&pending, true);
        assert!(item.click(Arrow::Down).is_ok());
    }

    #[test]
    fn failed_request_reverts_state_and_score() {
        let mut item = Votable::new(5, VoteState::Down);
        let pending = item.click(Arrow::Up).unwrap();
        assert_eq!((item.state(), item.score()), (VoteState::Up, 7));
        assert!(item.settle(&pending, false));
        assert_eq!((item.state(), item.score()), (VoteState::Down, 5));
        assert!(!item.is_in_flight());
    }

    #[test]
    fn likes_round_trip_through_state() {
        for likes in [Some(true), Some(false), None] {
            assert_eq!(VoteState::from_likes(likes).likes(), likes);
        }
    }

    #[test]
    fn save_toggle_reverts_on_failure() {
        let mut save = SaveToggle::new(false);
        let requested = save.toggle().unwrap();
        assert!(requested);
        assert_eq!(save.toggle(), Err(VoteError::InFlight));
        assert!(save.settle(requested, false));
        assert!(!save.is_saved());

        let requested = save.toggle().unwrap();
        assert!(!save.settle(requested, true));
        assert!(save.is_saved());
    }
}
