//! Inbound forwarding state machine.
//!
//! Inbound traffic on one host interface can be forwarded into the
//! container through the `try_arc` chain. Two independent signals drive it:
//! which interface to forward from, and whether the container is ready. The
//! rule is only installed once both are known, and `try_arc` never holds
//! more than one rule.

/// Where inbound forwarding currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InboundState {
    /// Nothing requested.
    #[default]
    Idle,
    /// Forwarding from this interface requested, rule not installed.
    Pending(String),
    /// Rule for this interface installed in `try_arc`.
    Active(String),
}

/// A side effect the owner must perform for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundAction<'a> {
    /// Remove every rule from `try_arc`.
    Flush,
    /// Append the rule forwarding from this interface.
    Install(&'a str),
}

/// Inbound forwarding state plus container readiness.
///
/// Transitions run their actions through a caller-supplied executor and only
/// commit the new state once the executor reports success, so a failed
/// command never leaves the state claiming a rule that is not there.
#[derive(Debug, Clone, Default)]
pub struct InboundMachine {
    state: InboundState,
    container_ready: bool,
}

impl InboundMachine {
    /// Create an idle machine with the container not ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &InboundState {
        &self.state
    }

    /// Whether the container reported ready.
    #[must_use]
    pub fn container_ready(&self) -> bool {
        self.container_ready
    }

    /// Whether a forwarding rule is installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, InboundState::Active(_))
    }

    /// Request forwarding from `ifname`.
    ///
    /// # Errors
    ///
    /// Propagates the first error from `exec`.
    pub fn enable<E, F>(&mut self, ifname: &str, mut exec: F) -> Result<(), E>
    where
        F: FnMut(InboundAction<'_>) -> Result<(), E>,
    {
        if let InboundState::Active(current) = &self.state {
            if current == ifname && self.container_ready {
                return Ok(());
            }
            exec(InboundAction::Flush)?;
            self.state = InboundState::Idle;
        }

        self.state = InboundState::Pending(ifname.to_string());
        if self.container_ready {
            exec(InboundAction::Install(ifname))?;
            self.state = InboundState::Active(ifname.to_string());
        }
        Ok(())
    }

    /// Record container readiness, installing a pending rule on `true`.
    ///
    /// Becoming not ready leaves an installed rule in place.
    ///
    /// # Errors
    ///
    /// Propagates the error from `exec`.
    pub fn set_ready<E, F>(&mut self, ready: bool, mut exec: F) -> Result<(), E>
    where
        F: FnMut(InboundAction<'_>) -> Result<(), E>,
    {
        self.container_ready = ready;
        if !ready {
            return Ok(());
        }

        if let InboundState::Pending(ifname) = &self.state {
            let ifname = ifname.clone();
            exec(InboundAction::Install(&ifname))?;
            self.state = InboundState::Active(ifname);
        }
        Ok(())
    }

    /// Drop any request and remove an installed rule.
    ///
    /// # Errors
    ///
    /// Propagates the error from `exec`.
    pub fn disable<E, F>(&mut self, mut exec: F) -> Result<(), E>
    where
        F: FnMut(InboundAction<'_>) -> Result<(), E>,
    {
        match self.state {
            InboundState::Idle => {}
            InboundState::Pending(_) => self.state = InboundState::Idle,
            InboundState::Active(_) => {
                exec(InboundAction::Flush)?;
                self.state = InboundState::Idle;
            }
        }
        Ok(())
    }
}
