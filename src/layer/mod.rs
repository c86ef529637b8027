pub mod rx;
pub mod tx;

use std::sync::Arc;

use crate::{
    event::Notifier,
    timer::{Clock, TimerService},
    utils::{
        excl::{ExclusionDomain, SpinDomain},
        SEQ12_HALF_SPACE,
    },
};

use rx::{ReorderConfig, RxReorder};
use tx::{DescPool, Transport, TsoConfig, TxPath, MAX_POOL_CAPACITY};

pub struct Builder {
    pub pool_capacity: usize,
    pub tso: TsoConfig,
    pub reorder: ReorderConfig,
    pub max_subscriptions: usize,
}

impl Builder {
    pub fn build<F, T>(
        self,
        transport: T,
        clock: Arc<dyn Clock>,
        timers: Arc<dyn TimerService>,
    ) -> Result<Datapath<F, T>, BuildError>
    where
        F: Send,
        T: Transport,
    {
        self.build_in::<F, T, SpinDomain>(transport, clock, timers)
    }

    /// Same as [`Builder::build`] with every shared structure guarded by `D`.
    pub fn build_in<F, T, D>(
        self,
        transport: T,
        clock: Arc<dyn Clock>,
        timers: Arc<dyn TimerService>,
    ) -> Result<Datapath<F, T, D>, BuildError>
    where
        F: Send,
        T: Transport,
        D: ExclusionDomain,
    {
        self.check()?;
        let notifier = Arc::new(Notifier::new(self.max_subscriptions));
        let pool = Arc::new(DescPool::new(self.pool_capacity, Arc::clone(&notifier)));
        let tx = TxPath::new(pool, transport, self.tso, Arc::clone(&notifier));
        let rx = RxReorder::new(&self.reorder, clock, timers, Arc::clone(&notifier));
        Ok(Datapath { notifier, tx, rx })
    }

    pub fn default() -> Self {
        Builder {
            pool_capacity: 1024,
            tso: TsoConfig::default(),
            reorder: ReorderConfig::default(),
            max_subscriptions: 64,
        }
    }

    fn check(&self) -> Result<(), BuildError> {
        if self.pool_capacity == 0 {
            return Err(BuildError::ZeroPoolCapacity);
        }
        if self.pool_capacity > MAX_POOL_CAPACITY {
            return Err(BuildError::PoolCapacityTooLarge);
        }
        if self.tso.enabled && self.tso.mss == 0 {
            return Err(BuildError::ZeroMss);
        }
        if self.reorder.win_size == 0 {
            return Err(BuildError::ZeroWindow);
        }
        if self.reorder.win_size > SEQ12_HALF_SPACE {
            return Err(BuildError::WindowTooLarge);
        }
        if self.reorder.timeout_ms.contains(&0) {
            return Err(BuildError::ZeroTimeout);
        }
        if self.reorder.max_peers == 0 {
            return Err(BuildError::ZeroPeers);
        }
        if self.max_subscriptions == 0 {
            return Err(BuildError::ZeroSubscriptions);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BuildError {
    ZeroPoolCapacity,
    PoolCapacityTooLarge,
    ZeroMss,
    ZeroWindow,
    WindowTooLarge,
    ZeroTimeout,
    ZeroPeers,
    ZeroSubscriptions,
}

/// One device's data path. TX and RX report through the same notifier.
pub struct Datapath<F: Send, T: Transport, D: ExclusionDomain = SpinDomain> {
    pub notifier: Arc<Notifier<D>>,
    pub tx: TxPath<T, D>,
    pub rx: RxReorder<F, D>,
}
