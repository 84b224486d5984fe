//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Lock-free metrics for the control server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be updated concurrently
/// without locks. Use [`ServerMetrics::snapshot`] for a point-in-time view.
#[derive(Debug)]
pub struct ServerMetrics {
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,
    broadcasts: AtomicU64,
    files_received: AtomicU64,
    connection_errors: AtomicU64,
    protocol_errors: AtomicU64,
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,
    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            files_received: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a new connection being accepted and registered
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection being torn down
    pub fn connection_closed(&self, duration: Duration) {
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a connection rejected at the limit
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broadcast sweep
    pub fn broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed inbound file transfer
    pub fn file_received(&self) {
        self.files_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection-level error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol violation
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Total connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Get a consistent snapshot of all metrics
    ///
    /// May be slightly stale under concurrent updates, which is close
    /// enough for monitoring purposes.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            files_received: self.files_received.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Connections closed at the configured limit
    pub rejected_connections: u64,
    /// Broadcast sweeps performed
    pub broadcasts: u64,
    /// Inbound file transfers completed
    pub files_received: u64,
    /// Connection-level errors
    pub connection_errors: u64,
    /// Protocol violations
    pub protocol_errors: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average connection duration over closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Connections accepted per second since start
    pub fn connections_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.total_connections as f64 / self.uptime.as_secs_f64()
    }

    /// Total error count
    pub fn total_errors(&self) -> u64 {
        self.connection_errors + self.protocol_errors
    }

    /// Errors per second since start
    pub fn error_rate(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.total_errors() as f64 / self.uptime.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = ServerMetrics::new();
        assert_eq!(metrics.total_connections(), 0);

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.total_connections(), 2);

        metrics.connection_closed(Duration::from_secs(10));
        metrics.connection_closed(Duration::from_secs(20));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.avg_connection_duration, Duration::from_secs(15));
    }

    #[test]
    fn test_error_tracking() {
        let metrics = ServerMetrics::new();
        metrics.connection_error();
        metrics.protocol_error();
        metrics.protocol_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connection_errors, 1);
        assert_eq!(snapshot.protocol_errors, 2);
        assert_eq!(snapshot.total_errors(), 3);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = std::sync::Arc::new(ServerMetrics::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let metrics = metrics.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    metrics.connection_opened();
                    metrics.broadcast();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 800);
        assert_eq!(snapshot.broadcasts, 800);
    }
}
