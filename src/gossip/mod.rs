// Gossip module - wire protocol and round-level bookkeeping

pub mod protocol;
pub mod round;

pub use protocol::{
    FilterAnnouncement, Message, MessageId, MessageType, ProtocolError, RecoveryProof,
    SettlementAnnouncement,
};
pub use round::{RoundConfig, SeenCache};
