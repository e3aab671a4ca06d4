// Centralized metric name constants for the chronology crate (capture, replay, retention)

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    #[allow(dead_code)]
    pub description: &'static str,
}

pub const CHUNK_CAPTURE_TOTAL: Metric = Metric {
    name: "pitr_chunk_capture_total",
    description: "Total number of oplog chunk captures (per prefix, result={ok,error,deferred})",
};

pub const CHUNK_UPLOAD_BYTES_TOTAL: Metric = Metric {
    name: "pitr_chunk_upload_bytes_total",
    description: "Total bytes of packaged chunks uploaded to the object store (per prefix)",
};

pub const CAPTURE_LATENCY_MS: Metric = Metric {
    name: "pitr_capture_latency_ms",
    description: "Latency of one capture: dump, package and upload (kind={oplog,full})",
};

pub const FULL_BACKUP_TOTAL: Metric = Metric {
    name: "pitr_full_backup_total",
    description: "Total number of full backups uploaded (per prefix, result)",
};

pub const CHUNK_REPLAY_TOTAL: Metric = Metric {
    name: "pitr_chunk_replay_total",
    description: "Total number of chunks replayed into the restore engine (result)",
};

pub const RETENTION_DELETE_TOTAL: Metric = Metric {
    name: "pitr_retention_delete_total",
    description: "Total number of objects removed by retention (kind={full,chunk}, result)",
};

#[allow(dead_code)]
pub const COUNTERS: &[Metric] = &[
    CHUNK_CAPTURE_TOTAL,
    CHUNK_UPLOAD_BYTES_TOTAL,
    FULL_BACKUP_TOTAL,
    CHUNK_REPLAY_TOTAL,
    RETENTION_DELETE_TOTAL,
];

#[allow(dead_code)]
pub const HISTOGRAMS: &[Metric] = &[CAPTURE_LATENCY_MS];
