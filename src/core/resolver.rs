use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::net::IpAddr;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use dns_lookup::lookup_addr;
use log::{debug, warn};

pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DNS_WORKERS: usize = 10;

/// Blocking reverse-lookup primitive.
pub trait HostLookup: Send + Sync {
    fn reverse(&self, addr: IpAddr) -> io::Result<String>;
}

/// Reverse lookups through the system resolver.
pub struct SystemLookup;

impl HostLookup for SystemLookup {
    fn reverse(&self, addr: IpAddr) -> io::Result<String> {
        lookup_addr(&addr)
    }
}

/// Counts lookup threads still running, including ones whose caller gave up
/// waiting, so abandoned lookups keep occupying a worker slot.
struct LookupSlots {
    limit: usize,
    busy: Mutex<usize>,
    freed: Condvar,
}

impl LookupSlots {
    fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            busy: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    /// Takes a slot, waiting at most `timeout` for one to free up.
    fn acquire(&self, timeout: Duration) -> bool {
        let guard = self.busy.lock().unwrap_or_else(|p| p.into_inner());
        let limit = self.limit;
        let (mut busy, _) = self
            .freed
            .wait_timeout_while(guard, timeout, |busy| *busy >= limit)
            .unwrap_or_else(|p| p.into_inner());
        if *busy >= limit {
            return false;
        }
        *busy += 1;
        true
    }

    fn release(&self) {
        let mut busy = self.busy.lock().unwrap_or_else(|p| p.into_inner());
        *busy = busy.saturating_sub(1);
        self.freed.notify_one();
    }
}

/// Reverse-DNS cache shared by every tick of a monitoring session.
///
/// Failed or timed-out lookups cache the address itself, so an address is
/// looked up at most once per session. The cache lock is never held while a
/// lookup is in flight. At most `max_workers` lookup threads run at once.
pub struct HostnameResolver {
    lookup: Arc<dyn HostLookup>,
    timeout: Duration,
    max_workers: usize,
    slots: Arc<LookupSlots>,
    cache: Mutex<HashMap<IpAddr, String>>,
}

impl HostnameResolver {
    pub fn new(lookup: Arc<dyn HostLookup>) -> Self {
        Self {
            lookup,
            timeout: DEFAULT_DNS_TIMEOUT,
            max_workers: DEFAULT_DNS_WORKERS,
            slots: Arc::new(LookupSlots::new(DEFAULT_DNS_WORKERS)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemLookup))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self.slots = Arc::new(LookupSlots::new(self.max_workers));
        self
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<IpAddr, String>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hostname for `addr`, or the address text when it cannot be resolved.
    pub fn resolve(&self, addr: IpAddr) -> String {
        if let Some(hostname) = self.cache().get(&addr) {
            return hostname.clone();
        }

        let hostname = self.lookup_with_timeout(addr);
        self.cache().insert(addr, hostname.clone());
        hostname
    }

    /// Resolves every distinct address in `addrs`, looking up only the ones
    /// missing from the cache, on at most `max_workers` threads.
    pub fn resolve_batch<I>(&self, addrs: I) -> HashMap<IpAddr, String>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let distinct: BTreeSet<IpAddr> = addrs.into_iter().collect();
        let mut results = HashMap::with_capacity(distinct.len());
        let mut pending = Vec::new();

        {
            let cache = self.cache();
            for addr in distinct {
                match cache.get(&addr) {
                    Some(hostname) => {
                        results.insert(addr, hostname.clone());
                    }
                    None => pending.push(addr),
                }
            }
        }

        match pending.as_slice() {
            [] => return results,
            [addr] => {
                results.insert(*addr, self.resolve(*addr));
                return results;
            }
            _ => {}
        }

        let workers = self.max_workers.min(pending.len());
        let queue = Mutex::new(pending.into_iter());
        let resolved = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue.lock().unwrap_or_else(|p| p.into_inner()).next();
                    let Some(addr) = next else {
                        break;
                    };
                    let hostname = self.lookup_with_timeout(addr);
                    resolved.lock().unwrap_or_else(|p| p.into_inner()).push((addr, hostname));
                });
            }
        });

        let resolved = resolved.into_inner().unwrap_or_else(|p| p.into_inner());
        let mut cache = self.cache();
        for (addr, hostname) in resolved {
            cache.entry(addr).or_insert_with(|| hostname.clone());
            results.insert(addr, hostname);
        }

        results
    }

    /// Copy of the address -> hostname table, ordered by address.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.cache()
            .iter()
            .map(|(addr, hostname)| (addr.to_string(), hostname.clone()))
            .collect()
    }

    fn lookup_with_timeout(&self, addr: IpAddr) -> String {
        if !self.slots.acquire(self.timeout) {
            debug!("No free lookup slot for {} within {:?}", addr, self.timeout);
            return addr.to_string();
        }

        let (tx, rx) = mpsc::channel();
        let lookup = Arc::clone(&self.lookup);
        let slots = Arc::clone(&self.slots);

        // The system resolver has no timeout of its own; an abandoned lookup
        // finishes on its detached thread, keeps its slot until then, and its
        // result is dropped.
        let spawned = thread::Builder::new()
            .name("dns-lookup".to_string())
            .spawn(move || {
                let _ = tx.send(lookup.reverse(addr));
                slots.release();
            });

        if let Err(e) = spawned {
            self.slots.release();
            warn!("Unable to spawn DNS lookup for {}: {}", addr, e);
            return addr.to_string();
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(hostname)) if !hostname.is_empty() => hostname,
            Ok(Ok(_)) => addr.to_string(),
            Ok(Err(e)) => {
                debug!("Reverse lookup failed for {}: {}", addr, e);
                addr.to_string()
            }
            Err(_) => {
                debug!("Reverse lookup for {} timed out after {:?}", addr, self.timeout);
                addr.to_string()
            }
        }
    }
}
