//! Core modules for Arbiter

pub mod tone_parser;
pub mod clarity;
pub mod phrases;
pub mod safety;
pub mod interrupt;
pub mod detector;
pub mod detectors;
pub mod collector;
pub mod resolver;
pub mod convergence;
pub mod looping;
pub mod collaborators;
pub mod session;
pub mod monitor;
pub mod orchestrator;
pub mod api;

pub use tone_parser::ToneParser;
pub use clarity::ClarityAnalyzer;
pub use safety::CatastrophicGate;
pub use interrupt::TempleInterruptGate;
pub use detector::SignalDetector;
pub use detectors::default_detectors;
pub use collector::{ClaimCollector, Collection};
pub use resolver::{ConfidenceGovernor, PriorityResolver};
pub use convergence::ConvergenceTracker;
pub use looping::{LoopContext, LoopTurn, LoopingProtocol};
pub use collaborators::{
    DraftDirective, DraftingOracle, InMemoryStore, MemoryStore, ResourceRouter, SessionSummary,
    StaticResourceRouter, VoiceSynthesizer,
};
pub use session::{default_session_id, SessionHandle, SessionManager};
pub use monitor::{EdgeCaseFlag, GlobalSummary, Monitor, MonitorEvent, MonitorReport, SessionMetrics};
pub use orchestrator::Orchestrator;
pub use api::{create_router, run_server};
