use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    ingest_requests: AtomicU64,
    ingest_entries: AtomicU64,
    ingest_errors: AtomicU64,
    flag_requests: AtomicU64,
    flag_errors: AtomicU64,
    flags: AtomicU64,
}

impl Metrics {
    pub fn record_ingest_request(&self) {
        self.ingest_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest_entries(&self, entry_count: usize) {
        self.ingest_entries
            .fetch_add(entry_count as u64, Ordering::Relaxed);
    }

    pub fn record_ingest_error(&self) {
        self.ingest_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag_request(&self) {
        self.flag_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag_error(&self) {
        self.flag_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flags(&self, count: usize) {
        self.flags.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        let requests = self.ingest_requests.load(Ordering::Relaxed);
        let entries = self.ingest_entries.load(Ordering::Relaxed);
        let errors = self.ingest_errors.load(Ordering::Relaxed);
        let flag_requests = self.flag_requests.load(Ordering::Relaxed);
        let flag_errors = self.flag_errors.load(Ordering::Relaxed);
        let flags = self.flags.load(Ordering::Relaxed);

        format!(
            "# TYPE rollcall_audit_ingest_requests_total counter\n\
rollcall_audit_ingest_requests_total {}\n\
# TYPE rollcall_audit_ingest_entries_total counter\n\
rollcall_audit_ingest_entries_total {}\n\
# TYPE rollcall_audit_ingest_errors_total counter\n\
rollcall_audit_ingest_errors_total {}\n\
# TYPE rollcall_flag_requests_total counter\n\
rollcall_flag_requests_total {}\n\
# TYPE rollcall_flag_errors_total counter\n\
rollcall_flag_errors_total {}\n\
# TYPE rollcall_flags_emitted_total counter\n\
rollcall_flags_emitted_total {}\n",
            requests, entries, errors, flag_requests, flag_errors, flags
        )
    }
}
