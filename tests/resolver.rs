use optab::OptabError;
use optab::construct::Schema;
use optab::model::{File, Instance, Module, Table};
use optab::query::{Query, SelectItem};
use optab::resolve::{Resolver, ResolverState};

fn literal(name: &str) -> Table {
    let schema = Schema::from_tags(&["k"], &["INTEGER"]).unwrap();
    let instance = Instance::new(&schema, Vec::new()).unwrap();
    Table::literal(name, schema, instance)
}

fn derived(name: &str, sources: &[&str]) -> Table {
    let mut query = Query::new(vec![SelectItem::parse("k -- INTEGER").unwrap()]).from(sources[0]);
    for source in &sources[1..] {
        query = query.cross_join(*source);
    }
    Table::from_query(name, query).unwrap()
}

fn file(tables: Vec<Table>) -> File {
    File::new(None, vec![Module::new("m", tables).unwrap()]).unwrap()
}

fn position(order: &[&str], name: &str) -> usize {
    order.iter().position(|n| *n == name).unwrap_or_else(|| panic!("{name} is not in {order:?}"))
}

#[test]
fn literal_tables_first_then_dependencies_before_dependents() {
    let file = file(vec![
        derived("d", &["c"]),
        derived("c", &["a", "b"]),
        literal("a"),
        literal("b"),
        derived("e", &["a"]),
    ]);
    let mut resolver = Resolver::for_file(&file).unwrap();
    assert_eq!(resolver.state(), ResolverState::Unresolved);
    resolver.find_dependencies().unwrap();
    assert_eq!(resolver.state(), ResolverState::DependenciesFound);
    assert_eq!(resolver.dependencies_of("c"), Some(&["a", "b"][..]));
    let order = resolver.resolve_dependencies().expect("acyclic").to_vec();
    assert_eq!(order, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(resolver.state(), ResolverState::Resolved);
    assert_eq!(resolver.resolution_order().unwrap(), &order[..]);
}

#[test]
fn every_table_follows_its_dependencies() {
    let file = file(vec![
        derived("report", &["totals", "regions"]),
        derived("totals", &["sales"]),
        literal("sales"),
        derived("regions", &["sales", "codes"]),
        literal("codes"),
        derived("summary", &["report"]),
    ]);
    let mut resolver = Resolver::for_file(&file).unwrap();
    let order = resolver.resolve_dependencies().unwrap().to_vec();
    assert_eq!(order.len(), 6);
    for (name, table) in file.tables().unwrap() {
        for dependency in table.query().map(|q| q.dependencies()).unwrap_or_default() {
            assert!(position(&order, dependency) < position(&order, name), "{dependency} before {name}");
        }
    }
}

#[test]
fn cycle_names_every_participant() {
    let file = file(vec![literal("z"), derived("a", &["b"]), derived("b", &["a"])]);
    let mut resolver = Resolver::for_file(&file).unwrap();
    let err = resolver.resolve_dependencies().unwrap_err();
    match &err {
        OptabError::Cycle { tables } => {
            assert!(tables.contains(&"a".to_string()));
            assert!(tables.contains(&"b".to_string()));
            assert!(!tables.contains(&"z".to_string()));
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(format!("{}", err).contains("a, b"));
    assert_eq!(resolver.state(), ResolverState::CycleError);
    // terminal
    assert!(matches!(resolver.resolve_dependencies().unwrap_err(), OptabError::State(_)));
    assert!(matches!(resolver.resolution_order().unwrap_err(), OptabError::State(_)));
}

#[test]
fn self_reference_is_a_cycle() {
    let file = file(vec![derived("loop", &["loop"])]);
    let mut resolver = Resolver::for_file(&file).unwrap();
    match resolver.resolve_dependencies().unwrap_err() {
        OptabError::Cycle { tables } => assert_eq!(tables, vec!["loop"]),
        other => panic!("expected a cycle, got {other}"),
    }
}

#[test]
fn order_is_unavailable_before_resolving() {
    let file = file(vec![literal("a")]);
    let resolver = Resolver::for_file(&file).unwrap();
    let err = resolver.resolution_order().unwrap_err();
    assert!(matches!(err, OptabError::State(_)));
}

#[test]
fn unknown_source_table() {
    let file = file(vec![derived("a", &["nowhere"])]);
    let mut resolver = Resolver::for_file(&file).unwrap();
    let err = resolver.find_dependencies().unwrap_err();
    assert!(matches!(err, OptabError::Dependency(_)));
    assert!(format!("{}", err).contains("unknown table 'nowhere'"));
}

#[test]
fn deep_chain_does_not_exhaust_the_stack() {
    let depth = 20_000;
    // declared deepest-last so the traversal has to descend the whole chain
    let mut tables: Vec<Table> = (1..=depth)
        .rev()
        .map(|i| derived(&format!("t{i}"), &[format!("t{}", i - 1).as_str()]))
        .collect();
    tables.push(literal("t0"));
    let file = file(tables);
    let mut resolver = Resolver::for_file(&file).unwrap();
    let order = resolver.resolve_dependencies().unwrap();
    assert_eq!(order.len(), depth + 1);
    assert_eq!(order[0], "t0");
    assert_eq!(order[depth], format!("t{depth}"));
}

#[test]
fn duplicate_table_names_across_modules_fail() {
    let err = File::new(
        None,
        vec![Module::new("one", vec![literal("a")]).unwrap(), Module::new("two", vec![literal("a")]).unwrap()],
    )
    .unwrap_err();
    assert!(format!("{}", err).contains("Table 'a' is declared more than once"));
    assert!(Module::new("one", vec![literal("a"), literal("a")]).is_err());
}
