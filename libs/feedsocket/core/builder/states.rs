/// Type-state markers for the builder pattern
///
/// The URL and the router are mandatory; these markers make `build()`
/// unreachable until both are set.
use crate::core::builder::RoutingBuilder;
use crate::traits::MessageRouter;

/// Marker trait for URL state
pub trait UrlState {}

/// URL has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// URL has been set
pub struct HasUrl;
impl UrlState for HasUrl {}

/// Router has not been set
pub struct NoRouter;

/// Router and its handlers have been set
pub struct Routed<R>
where
    R: MessageRouter,
{
    pub(crate) router: R,
    pub(crate) routing: RoutingBuilder<R>,
}
