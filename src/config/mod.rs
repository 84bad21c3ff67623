mod loader;

pub use loader::{
    AgentProfile, Config, CoordinationConfig, CorpusConfig, CriticalLevel, EntryPointConfig,
    LockConfig, ResolverConfig, SafetyConfig, UsageMapConfig,
};
