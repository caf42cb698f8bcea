//! Route reference text to the resolver for its schema.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dexec_core::reference::{split_schema, Reference, ReferenceKind};
use dexec_sdk::{FrameworkMode, FrameworkResolver};
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};

use crate::environment::ResolverEnvironment;
use crate::local::{FileResolver, FolderResolver};
use crate::outcome::{AssetMode, ResolveRequest, Resolved};
use crate::project::{DotnetBuilder, ProjectResolver};
use crate::transitive::NuGetResolver;

/// Resolves one kind of reference to assemblies.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    fn kind(&self) -> ReferenceKind;

    async fn resolve(
        &self,
        reference: &Reference,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved>;
}

pub(crate) fn wrong_kind(reference: &Reference, expected: ReferenceKind) -> DexecError {
    DexecError::InvalidReference {
        reference: reference.to_string(),
        message: format!("not a {expected} reference"),
    }
}

/// `framework:` references through the SDK-first framework resolver.
pub struct FrameworkReferenceResolver {
    inner: FrameworkResolver,
}

impl FrameworkReferenceResolver {
    pub fn new(inner: FrameworkResolver) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ReferenceResolver for FrameworkReferenceResolver {
    fn kind(&self) -> ReferenceKind {
        ReferenceKind::Framework
    }

    async fn resolve(
        &self,
        reference: &Reference,
        request: &ResolveRequest,
        cancel: &CancelToken,
    ) -> DexecResult<Resolved> {
        let Reference::FrameworkReference { name } = reference else {
            return Err(wrong_kind(reference, self.kind()));
        };
        let paths = match request.mode {
            AssetMode::Analyzers => {
                self.inner
                    .resolve_analyzers(*name, &request.framework, cancel)
                    .await?
            }
            mode => {
                let mode = FrameworkMode::from_compile_flag(mode == AssetMode::Compile);
                self.inner
                    .resolve(*name, &request.framework, mode, cancel)
                    .await?
            }
        };
        Ok(Resolved::from_assemblies(paths))
    }
}

/// A parsed reference with the resolver bound to its kind.
pub struct Dispatched {
    pub kind: ReferenceKind,
    pub payload: String,
    pub reference: Reference,
    pub resolver: Arc<dyn ReferenceResolver>,
}

/// One resolver per reference kind, built once and shared.
pub struct ResolverFactory {
    resolvers: HashMap<ReferenceKind, Arc<dyn ReferenceResolver>>,
}

impl ResolverFactory {
    /// An empty factory; every dispatch fails until resolvers are registered.
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// The standard resolver for every kind.
    pub fn from_environment(env: &ResolverEnvironment) -> Self {
        let client = env.client().clone();
        let sdk = env.sdk().cloned();
        let sdk_root = sdk.as_ref().map(|s| s.root().to_path_buf());
        let max_concurrency = env.config().resolve.max_concurrency;

        let mut factory = Self::empty();
        factory.register(Arc::new(FileResolver));
        factory.register(Arc::new(FolderResolver));
        factory.register(Arc::new(
            NuGetResolver::new(client.clone()).with_max_concurrency(max_concurrency),
        ));
        factory.register(Arc::new(FrameworkReferenceResolver::new(
            FrameworkResolver::new(sdk, client),
        )));
        factory.register(Arc::new(ProjectResolver::new(Arc::new(DotnetBuilder::new(
            sdk_root.as_deref(),
        )))));
        factory
    }

    /// Install `resolver` for its kind, replacing any previous one.
    pub fn register(&mut self, resolver: Arc<dyn ReferenceResolver>) {
        self.resolvers.insert(resolver.kind(), resolver);
    }

    pub fn resolver_for(&self, kind: ReferenceKind) -> DexecResult<Arc<dyn ReferenceResolver>> {
        self.resolvers
            .get(&kind)
            .cloned()
            .ok_or_else(|| DexecError::UnsupportedReferenceKind {
                schema: kind.schema().to_string(),
            })
    }

    /// Classify `text` by schema and bind its resolver. Text without a
    /// schema is a file path.
    pub fn dispatch(&self, text: &str) -> DexecResult<Dispatched> {
        let (kind, payload) = split_schema(text)?;
        let reference =
            Reference::from_payload(kind, payload).map_err(|message| DexecError::InvalidReference {
                reference: text.trim().to_string(),
                message,
            })?;
        Ok(Dispatched {
            kind,
            payload: payload.to_string(),
            reference,
            resolver: self.resolver_for(kind)?,
        })
    }
}
