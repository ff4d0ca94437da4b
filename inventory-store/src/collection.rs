//! In-memory record collection and its CSV encoding
//!
//! The collection keeps records in first-seen order plus an index from MAC
//! address to position, so an update never moves a record. The header read
//! from disk is kept as the schema and reused when the file is rewritten.

use crate::error::Result;
use crate::policy::{Discrepancy, ReconcilePolicy};
use crate::record::{Field, Record};
use std::collections::HashMap;
use std::io;
use tracing::{debug, warn};

/// What a reconcile did to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// No collection existed; it was created with the observation as sole row
    Created,
    /// Unknown host appended at the end
    Inserted,
    /// Known host merged in place
    Updated,
}

/// Ordered column layout of a persisted collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Field>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::canonical()
    }
}

impl Schema {
    /// Fixed order used for new collections
    pub fn canonical() -> Self {
        Self {
            columns: Field::ALL.to_vec(),
        }
    }

    /// Columns as read from the header, duplicates and unknown names removed
    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    /// Columns to write: the stored order, then any known column the header lacked
    pub fn completed(&self) -> Vec<Field> {
        let mut columns = self.columns.clone();
        for field in Field::ALL {
            if !columns.contains(&field) {
                columns.push(field);
            }
        }
        columns
    }

    /// Parse a header row into a schema and a per-cell column map
    fn from_header(header: &csv::StringRecord) -> (Self, Vec<Option<Field>>) {
        let mut columns = Vec::new();
        let mut layout = Vec::with_capacity(header.len());

        for cell in header.iter() {
            let name = cell.trim_start_matches('\u{feff}');
            match Field::from_name(name) {
                Some(field) if !columns.contains(&field) => {
                    columns.push(field);
                    layout.push(Some(field));
                }
                Some(field) => {
                    warn!("Duplicate column '{}' in header, keeping the first one", field);
                    layout.push(None);
                }
                None => {
                    warn!("Ignoring unknown column '{}'", name);
                    layout.push(None);
                }
            }
        }

        (Self { columns }, layout)
    }
}

/// Records keyed by MAC address, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct RecordCollection {
    schema: Schema,
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordCollection {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// First-run collection holding a single record
    pub fn with_record(record: Record) -> Self {
        let mut collection = Self::new(Schema::canonical());
        collection.push(record);
        collection
    }

    /// Parse a CSV document
    ///
    /// An empty document, a header-only document or a header without any known
    /// column all yield an empty collection with the canonical schema. Rows that
    /// fail to decode are skipped.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = reader.records();

        let header = match rows.next() {
            None => {
                debug!("Collection is empty, using canonical schema");
                return Ok(Self::default());
            }
            Some(Err(e)) => {
                warn!("Unreadable header ({}), using canonical schema", e);
                return Ok(Self::default());
            }
            Some(Ok(header)) => header,
        };

        let (schema, layout) = Schema::from_header(&header);
        if schema.columns().is_empty() {
            warn!("Header has no known column, using canonical schema");
            return Ok(Self::default());
        }

        let mut collection = Self::new(schema);
        for (line, row) in rows.enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable row {}: {}", line + 2, e);
                    continue;
                }
            };

            let mut record = Record::default();
            for (cell, column) in row.iter().zip(layout.iter()) {
                if let Some(field) = column {
                    record.set_value(*field, cell);
                }
            }

            let mac = record.mac_address.clone();
            if !collection.push(record) {
                warn!("Dropping duplicate record for {} at row {}", mac, line + 2);
            }
        }

        if collection.is_empty() {
            debug!("Collection has no rows, using canonical schema");
            collection.schema = Schema::canonical();
        }

        debug!("Loaded {} records", collection.len());
        Ok(collection)
    }

    /// Encode the whole collection: header first, then one row per record
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<()> {
        let columns = self.schema.completed();
        let mut writer = csv::Writer::from_writer(writer);

        writer.write_record(columns.iter().map(|field| field.name()))?;
        for record in &self.records {
            writer.write_record(columns.iter().map(|&field| record.value(field).into_owned()))?;
        }

        writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Merge an observation into the collection
    ///
    /// A known host is compared under `policy` and then overwritten in place
    /// whatever the comparison found. An unknown host is appended.
    pub fn upsert(&mut self, observation: Record, policy: &ReconcilePolicy) -> (MergeAction, Vec<Discrepancy>) {
        match self.index.get(&observation.mac_address).copied() {
            Some(position) => {
                let stored = &mut self.records[position];
                let discrepancies = policy.compare(stored, &observation, self.schema.columns());
                *stored = observation;
                (MergeAction::Updated, discrepancies)
            }
            None => {
                self.push(observation);
                (MergeAction::Inserted, Vec::new())
            }
        }
    }

    /// Append a record unless its MAC is already present
    ///
    /// A blank MAC is not an identity: such rows are kept but never indexed.
    fn push(&mut self, record: Record) -> bool {
        if !record.mac_address.is_empty() {
            if self.index.contains_key(&record.mac_address) {
                return false;
            }
            self.index.insert(record.mac_address.clone(), self.records.len());
        }
        self.records.push(record);
        true
    }

    pub fn get(&self, mac_address: &str) -> Option<&Record> {
        self.index.get(mac_address).map(|&position| &self.records[position])
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
