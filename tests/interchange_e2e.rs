use civic_dedupe::civic::{City, County, Locality, State};
use civic_dedupe::interchange::{
    dump_aliases, dump_aliases_to_path, load_aliases, load_aliases_from_path,
};
use civic_dedupe::{
    AliasSet, DedupeConfig, DedupeEngine, InMemoryRecordStore, Lookup, RelationshipRegistry,
};
use std::fs;
use std::sync::Arc;

const ALIASES: &str = "\
name,short_name,state__short_name,aliases
Alameda,,CA,\"ALAMEDA,Alameda City\"
San Diego,SD,CA,\"La Jolla, Del Mar\"
Oakland,,CA,Oaktown
Reno,,NV,Biggest Little City
";

fn cities(engine: &DedupeEngine) -> Vec<City> {
    engine.select::<City>(&Lookup::new()).unwrap()
}

#[test]
fn load_then_dump_round_trips_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("aliases.csv");
    let output = dir.path().join("dump.csv");
    fs::write(&input, ALIASES).unwrap();

    let engine = DedupeEngine::in_memory();
    let report = load_aliases_from_path(&engine, &input).unwrap();
    assert_eq!(report.rows, 4);
    assert_eq!(report.created, 4);
    assert_eq!(report.set, 4);
    assert_eq!(engine.select::<State>(&Lookup::new()).unwrap().len(), 2);

    assert_eq!(dump_aliases_to_path(&engine, &output).unwrap(), 4);

    let reloaded = DedupeEngine::in_memory();
    load_aliases_from_path(&reloaded, &output).unwrap();
    let mut before: Vec<_> = cities(&engine)
        .into_iter()
        .map(|c| (c.name, AliasSet::from_field(c.aliases.as_deref()).to_text()))
        .collect();
    let mut after: Vec<_> = cities(&reloaded)
        .into_iter()
        .map(|c| (c.name, AliasSet::from_field(c.aliases.as_deref()).to_text()))
        .collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
}

#[test]
fn loading_twice_changes_nothing() {
    let engine = DedupeEngine::in_memory();
    load_aliases(&engine, ALIASES.as_bytes()).unwrap();
    let first = cities(&engine);

    let report = load_aliases(&engine, ALIASES.as_bytes()).unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.unchanged, 4);
    assert_eq!(report.skipped, 0);
    assert_eq!(cities(&engine), first);
}

#[test]
fn loading_keeps_existing_aliases() {
    let engine = DedupeEngine::in_memory();
    load_aliases(&engine, ALIASES.as_bytes()).unwrap();

    for mut city in cities(&engine) {
        city.aliases = Some(format!("stuff {}", city.name));
        engine.save(city).unwrap();
    }

    let report = load_aliases(&engine, ALIASES.as_bytes()).unwrap();
    assert_eq!(report.extended, 4);

    for city in cities(&engine) {
        let aliases = AliasSet::from_field(city.aliases.as_deref());
        assert!(aliases.contains(&format!("stuff {}", city.name)), "{city:?}");
        assert!(aliases.len() > 1, "{city:?}");
    }
}

#[test]
fn loaded_alias_merges_existing_city() {
    let engine = DedupeEngine::in_memory();
    let (ca, _) = engine.get_or_create::<State>("CA", &Lookup::new()).unwrap();
    let in_ca = Lookup::new().eq("state", ca.id);
    let (alamo, _) = engine.get_or_create::<City>("Alamo", &in_ca).unwrap();
    engine.get_or_create::<City>("ALAMEDA", &in_ca).unwrap();

    let csv = "name,short_name,state__short_name,aliases\nAlamo,,CA,Alameda\n";
    let report = load_aliases(&engine, csv.as_bytes()).unwrap();
    assert_eq!(report.merges, 1);

    let live = cities(&engine);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, alamo.id);
    assert_eq!(
        AliasSet::from_field(live[0].aliases.as_deref()),
        AliasSet::parse("Alameda,ALAMEDA")
    );
}

#[test]
fn conflicting_rows_are_skipped() {
    let engine = DedupeEngine::in_memory();
    load_aliases(&engine, ALIASES.as_bytes()).unwrap();

    // "Oaktown" already belongs to Oakland.
    let csv = "name,short_name,state__short_name,aliases\nBerkeley,,CA,Oaktown\nFremont,,CA,Mission San Jose\n";
    let report = load_aliases(&engine, csv.as_bytes()).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.set, 1);

    let oakland: City = engine.find("Oaktown", &Lookup::new()).unwrap();
    assert_eq!(oakland.name, "Oakland");
    // The skipped row's city was rolled back with it.
    assert!(engine
        .find::<City>("Berkeley", &Lookup::new())
        .unwrap_err()
        .is_not_found());
    assert_eq!(report.created, 1);
}

#[test]
fn skipped_row_leaves_no_new_state_behind() {
    let engine = DedupeEngine::in_memory();
    load_aliases(&engine, ALIASES.as_bytes()).unwrap();

    let csv = "name,short_name,state__short_name,aliases\nSparks,,NV,Biggest Little City\nPortland,,OR,Oaktown\n";
    let report = load_aliases(&engine, csv.as_bytes()).unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.created, 0);

    let states: Vec<String> = engine
        .select::<State>(&Lookup::new())
        .unwrap()
        .into_iter()
        .map(|state| state.short_name)
        .collect();
    assert_eq!(states, vec!["CA", "NV"]);
}

#[test]
fn localities_are_dumped_before_cities() {
    let engine = DedupeEngine::in_memory();
    engine.save(Locality::new("East Bay")).unwrap();
    let mut bay_area = engine.save(Locality::new("Bay Area")).unwrap().entity;
    bay_area.short_name = Some("SFBA".to_string());
    bay_area.aliases = Some("east bay".to_string());
    engine.save(bay_area).unwrap();
    engine.save(Locality::new("Peninsula")).unwrap();

    let (ca, _) = engine.get_or_create::<State>("CA", &Lookup::new()).unwrap();
    let mut oakland = City::new("Oakland").in_state(ca.id);
    oakland.aliases = Some("Oaktown".to_string());
    engine.save(oakland).unwrap();

    let mut out = Vec::new();
    assert_eq!(dump_aliases(&engine, &mut out).unwrap(), 2);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "name,short_name,state__short_name,aliases\n\
         Bay Area,SFBA,,\"east bay,East Bay\"\n\
         Oakland,,CA,Oaktown\n"
    );
}

#[test]
fn dump_includes_counties_with_their_state() {
    let engine = DedupeEngine::in_memory();
    let (ca, _) = engine.get_or_create::<State>("CA", &Lookup::new()).unwrap();
    let mut county = County::new("Alameda County").in_state(ca.id);
    county.aliases = Some("Alameda Co".to_string());
    engine.save(county).unwrap();
    engine.save(City::new("No Aliases")).unwrap();

    let mut out = Vec::new();
    assert_eq!(dump_aliases(&engine, &mut out).unwrap(), 1);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "name,short_name,state__short_name,aliases\nAlameda County,,CA,Alameda Co\n"
    );
}

#[test]
fn snapshot_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("civic-aliases.json");

    let engine = DedupeEngine::in_memory();
    load_aliases(&engine, ALIASES.as_bytes()).unwrap();
    engine.store().write_snapshot(&snapshot).unwrap();

    let restored = DedupeEngine::new(
        Arc::new(InMemoryRecordStore::open_snapshot(&snapshot).unwrap()),
        RelationshipRegistry::civic(),
        DedupeConfig::default(),
    );
    let (nv, _) = restored.get_or_create::<State>("NV", &Lookup::new()).unwrap();
    let reno: City = restored
        .find("Biggest Little City", &Lookup::new().eq("state", nv.id))
        .unwrap();
    assert_eq!(reno.name, "Reno");
}
