use inventory_store::{
    reconcile, ActivePorts, Field, MergeAction, ReconcilePolicy, Record, RecordStore, StoreError,
    WanSpeed,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn observation(mac: &str, name: &str, wan: Option<f64>) -> Record {
    Record {
        mac_address: mac.to_string(),
        computer_name: name.to_string(),
        system_timezone: "CET".to_string(),
        ip_address: "192.168.1.42".to_string(),
        processor_model: "Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz".to_string(),
        operating_system: "Linux 6.1.0-18-amd64".to_string(),
        wan_speed: WanSpeed::from(wan),
        active_ports: ActivePorts::from_ports([22, 443]),
    }
}

fn output(dir: &TempDir) -> PathBuf {
    dir.path().join("endpoint-scanner-output.csv")
}

#[test]
fn test_bootstrap_creates_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    let obs = observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0));

    let outcome = reconcile(&path, &obs).unwrap();
    assert!(outcome.written);
    assert_eq!(outcome.action, MergeAction::Created);
    assert!(outcome.discrepancies.is_empty());

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.records()[0], obs);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(
        "MAC Address,Computer Name,System Timezone,IP Address,Processor Model,Operating System,WAN Speed,Active Ports"
    ));
}

#[test]
fn test_identity_uniqueness_keeps_last_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    for (i, name) in ["HOST-A", "HOST-B", "HOST-C", "HOST-D"].iter().enumerate() {
        let obs = observation("aa:bb:cc:dd:ee:01", name, Some(40.0 + i as f64));
        reconcile(&path, &obs).unwrap();
    }

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.len(), 1);
    assert_eq!(
        collection.records()[0],
        observation("aa:bb:cc:dd:ee:01", "HOST-D", Some(43.0))
    );
}

#[test]
fn test_new_host_appended_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    let first = observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0));
    let second = observation("aa:bb:cc:dd:ee:02", "HOST-B", None);
    let third = observation("aa:bb:cc:dd:ee:03", "HOST-C", Some(12.5));
    reconcile(&path, &first).unwrap();
    reconcile(&path, &second).unwrap();

    let outcome = reconcile(&path, &third).unwrap();
    assert_eq!(outcome.action, MergeAction::Inserted);
    assert!(outcome.discrepancies.is_empty());

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.records(), &[first, second, third]);
}

#[test]
fn test_update_keeps_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", None)).unwrap();
    reconcile(&path, &observation("aa:bb:cc:dd:ee:02", "HOST-B", None)).unwrap();
    let outcome = reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A2", None)).unwrap();
    assert_eq!(outcome.action, MergeAction::Updated);

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    let macs: Vec<&str> = collection.iter().map(|r| r.mac_address.as_str()).collect();
    assert_eq!(macs, vec!["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"]);
    assert_eq!(collection.records()[0].computer_name, "HOST-A2");
}

#[test]
fn test_wan_speed_within_tolerance_is_silent_but_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    let outcome = reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(58.0))).unwrap();
    assert!(outcome.discrepancies.is_empty());

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.records()[0].wan_speed, WanSpeed::Measured(58.0));
}

#[test]
fn test_wan_speed_beyond_tolerance_is_flagged_and_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    let outcome = reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(65.0))).unwrap();

    assert_eq!(outcome.discrepancies.len(), 1);
    let discrepancy = &outcome.discrepancies[0];
    assert_eq!(discrepancy.field, Field::WanSpeed);
    assert_eq!(discrepancy.previous, "50.00");
    assert_eq!(discrepancy.current, "65.00");

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.records()[0].wan_speed, WanSpeed::Measured(65.0));
}

#[test]
fn test_missing_wan_speed_is_accepted_and_clears_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    let outcome = reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", None)).unwrap();
    assert!(outcome.discrepancies.is_empty());

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.records()[0].wan_speed, WanSpeed::Unmeasured);
}

#[test]
fn test_exact_match_field_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    let mut changed = observation("aa:bb:cc:dd:ee:01", "HOST-B", Some(50.0));
    changed.active_ports = ActivePorts::from_ports([22]);
    let outcome = reconcile(&path, &changed).unwrap();

    let fields: Vec<Field> = outcome.discrepancies.iter().map(|d| d.field).collect();
    assert_eq!(fields, vec![Field::ComputerName, Field::ActivePorts]);
    assert_eq!(
        outcome.discrepancies[0].to_string(),
        "Computer Name: previous 'HOST-A', current 'HOST-B'"
    );
    assert_eq!(
        outcome.discrepancies[1].to_string(),
        "Active Ports: previous '22; 443', current '22'"
    );
}

#[test]
fn test_round_trip_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    let store = RecordStore::new(&path);

    let mut quoted = observation("aa:bb:cc:dd:ee:02", "HOST, \"quoted\"", None);
    quoted.active_ports = ActivePorts::from_ports([]);
    let records = vec![observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(93.17)), quoted];

    reconcile(&path, &records[0]).unwrap();
    reconcile(&path, &records[1]).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.records(), records.as_slice());

    store.save(&loaded).unwrap();
    let reloaded = store.load().unwrap().unwrap();
    assert_eq!(reloaded.records(), records.as_slice());
}

#[test]
fn test_port_formatting_ignores_untracked() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    let mut obs = observation("aa:bb:cc:dd:ee:01", "HOST-A", None);
    obs.active_ports = ActivePorts::from_ports([22, 443, 9999]);
    reconcile(&path, &obs).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.lines().nth(1).unwrap().ends_with(",22; 443"));
}

#[test]
fn test_empty_existing_file_uses_observation_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    fs::write(&path, "").unwrap();

    let obs = observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0));
    let outcome = reconcile(&path, &obs).unwrap();
    assert_eq!(outcome.action, MergeAction::Inserted);

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.records(), &[obs]);
    assert_eq!(collection.schema().columns(), &Field::ALL);
}

#[test]
fn test_header_only_file_uses_observation_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    fs::write(&path, "Active Ports,MAC Address\n").unwrap();

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", None)).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("MAC Address,Computer Name,"));
}

#[test]
fn test_legacy_file_with_python_float_and_reordered_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    fs::write(
        &path,
        "Computer Name,MAC Address,WAN Speed,Active Ports\nHOST-A,aa:bb:cc:dd:ee:01,58.0,22; 443\nHOST-Z,aa:bb:cc:dd:ee:09,,\n",
    )
    .unwrap();

    let obs = observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(60.0));
    let outcome = reconcile(&path, &obs).unwrap();
    assert_eq!(outcome.action, MergeAction::Updated);
    assert!(outcome.discrepancies.is_empty());

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Computer Name,MAC Address,WAN Speed,Active Ports,System Timezone,IP Address,Processor Model,Operating System"
    );
    assert!(lines.next().unwrap().starts_with("HOST-A,aa:bb:cc:dd:ee:01,60.00,22; 443,CET,"));
    assert!(lines.next().unwrap().starts_with("HOST-Z,aa:bb:cc:dd:ee:09,,,"));
}

#[test]
fn test_unparsed_stored_wan_speed_is_a_discrepancy() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    fs::write(
        &path,
        "MAC Address,Computer Name,System Timezone,IP Address,Processor Model,Operating System,WAN Speed,Active Ports\n\
         aa:bb:cc:dd:ee:01,HOST-A,CET,192.168.1.42,Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz,Linux 6.1.0-18-amd64,corrupt,22; 443\n",
    )
    .unwrap();

    let outcome = reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    assert_eq!(outcome.discrepancies.len(), 1);
    assert_eq!(outcome.discrepancies[0].field, Field::WanSpeed);
    assert_eq!(outcome.discrepancies[0].previous, "corrupt");

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.records()[0].wan_speed, WanSpeed::Measured(50.0));
}

#[test]
fn test_custom_policy_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(output(&dir)).with_policy(ReconcilePolicy {
        wan_speed_tolerance: 1.0,
    });

    store.reconcile(&observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    let outcome = store
        .reconcile(&observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(52.0)))
        .unwrap();
    assert_eq!(outcome.discrepancies.len(), 1);
}

#[test]
fn test_invalid_mac_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    let err = reconcile(&path, &observation("AA:BB:CC:DD:EE:01", "HOST-A", None)).unwrap_err();
    assert!(matches!(err, StoreError::InvalidObservation(_)));
    assert!(!path.exists());
}

#[test]
fn test_no_temporary_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", None)).unwrap();
    reconcile(&path, &observation("aa:bb:cc:dd:ee:02", "HOST-B", None)).unwrap();

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["endpoint-scanner-output.csv", "endpoint-scanner-output.csv.lock"]
    );
}

#[test]
fn test_concurrent_runs_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);

    std::thread::scope(|scope| {
        for i in 0..16u8 {
            let path = &path;
            scope.spawn(move || {
                let mac = format!("aa:bb:cc:dd:ee:{:02x}", i);
                reconcile(path, &observation(&mac, &format!("HOST-{}", i), None)).unwrap();
            });
        }
    });

    let collection = RecordStore::new(&path).load().unwrap().unwrap();
    assert_eq!(collection.len(), 16);
    for i in 0..16u8 {
        assert!(collection.get(&format!("aa:bb:cc:dd:ee:{:02x}", i)).is_some());
    }
}

#[test]
fn test_failed_rename_leaves_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    fs::create_dir(&path).unwrap();
    fs::write(path.join("keep.txt"), "previous").unwrap();

    let err = reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", None)).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. } | StoreError::Persist(_)));

    assert!(path.is_dir());
    assert_eq!(fs::read_to_string(path.join("keep.txt")).unwrap(), "previous");
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[cfg(unix)]
#[test]
fn test_failed_write_keeps_previous_file() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = output(&dir);
    reconcile(&path, &observation("aa:bb:cc:dd:ee:01", "HOST-A", Some(50.0))).unwrap();
    let before = fs::read(&path).unwrap();

    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
    // Permission bits are not enforced for privileged users
    if fs::File::create(dir.path().join("writable-check")).is_ok() {
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = reconcile(&path, &observation("aa:bb:cc:dd:ee:02", "HOST-B", None));
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, StoreError::Io { .. } | StoreError::Persist(_)));
    assert_eq!(fs::read(&path).unwrap(), before);
}
