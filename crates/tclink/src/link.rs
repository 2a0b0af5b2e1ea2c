//! `LinkBuilder`: one call from configuration to a running robot link.
//!
//! This ties the layers together for the common case: the robot packet
//! family, the default codec and either the LAN transport or an
//! in-process [`MemoryNetwork`].

use tclink_robot::{build_registry, RobotPacket};
use tclink_session::{Session, SessionConfig};
use tclink_transport::{LanConfig, LanTransport, MemoryNetwork, MemoryTransport};

use crate::TclinkError;

/// A session speaking the robot packet family over the LAN.
pub type RobotLink = Session<LanTransport, RobotPacket>;

/// A session speaking the robot packet family inside one process.
pub type LocalRobotLink = Session<MemoryTransport, RobotPacket>;

/// Builder for a robot link.
///
/// # Example
///
/// ```rust,no_run
/// use tclink::prelude::*;
///
/// let link = LinkBuilder::new("master")
///     .opposite("slave")
///     .discovery_port(30108)
///     .build()?;
/// link.connect()?;
/// link.send(&MotorPowerPacket::new(3, 0.5))?;
/// # Ok::<(), TclinkError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    name: String,
    lan: LanConfig,
    session: SessionConfig,
}

impl LinkBuilder {
    /// Starts a builder for the peer called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lan: LanConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// Sets the peer to connect to. Traffic from other peers is ignored.
    pub fn opposite(mut self, name: impl Into<String>) -> Self {
        self.session.opposite = Some(name.into());
        self
    }

    /// Moves discovery to `port`: both the bind address and every
    /// broadcast target.
    pub fn discovery_port(mut self, port: u16) -> Self {
        self.lan.discovery_bind.set_port(port);
        for target in &mut self.lan.broadcast_targets {
            target.set_port(port);
        }
        self
    }

    /// Replaces the LAN transport configuration.
    pub fn lan_config(mut self, config: LanConfig) -> Self {
        self.lan = config;
        self
    }

    /// Replaces the session configuration. An opposite set earlier is kept
    /// unless `config` names its own.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        let opposite = self.session.opposite.take();
        self.session = config;
        if self.session.opposite.is_none() {
            self.session.opposite = opposite;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the LAN transport and starts the session.
    ///
    /// # Errors
    /// Configuration, runtime and socket bind failures.
    pub fn build(self) -> Result<RobotLink, TclinkError> {
        tracing::debug!(name = %self.name, opposite = ?self.session.opposite, "building LAN link");
        let transport = LanTransport::bind(self.name, self.lan);
        Ok(Session::open(self.session, build_registry(), transport)?)
    }

    /// Joins `network` and starts the session there. The LAN settings are
    /// ignored.
    ///
    /// # Errors
    /// Configuration and runtime failures, or the name being taken on
    /// `network`.
    pub fn build_local(self, network: &MemoryNetwork) -> Result<LocalRobotLink, TclinkError> {
        tracing::debug!(name = %self.name, opposite = ?self.session.opposite, "building local link");
        let transport = network.join(self.name)?;
        Ok(Session::open(
            self.session,
            build_registry(),
            std::future::ready(Ok(transport)),
        )?)
    }
}
