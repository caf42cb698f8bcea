//! Reference resolution: schema dispatch, file/folder/project resolvers,
//! transitive NuGet resolution with a "highest version wins" merge, and the
//! cached, concurrent resolution session.

pub mod conflict;
pub mod dispatch;
pub mod environment;
pub mod graph;
pub mod local;
pub mod outcome;
pub mod project;
pub mod session;
pub mod transitive;

pub use dispatch::{Dispatched, ReferenceResolver, ResolverFactory};
pub use environment::ResolverEnvironment;
pub use outcome::{AssetMode, ReferenceFailure, ResolutionOutcome, ResolveRequest, ResolvedReferenceSet};
pub use session::{ResolutionSession, SessionOptions};
pub use transitive::NuGetResolver;
