mod common;

use std::sync::Arc;

use asterix::descriptor::DEFINITIONS_ENV;
use asterix::get_or_create_context;

use common::fixture_path;

// The process-wide context and its environment variable are shared state, so every check
// lives in this one test.
#[test]
fn context_is_created_once() {
    std::env::set_var(DEFINITIONS_ENV, "/definitely/not/here/asterix.ini");
    assert!(get_or_create_context().is_none());
    assert!(get_or_create_context().is_none());

    std::env::set_var(DEFINITIONS_ENV, fixture_path("asterix.ini"));
    let first = get_or_create_context().unwrap();
    assert_eq!(first.definition().len(), 2);

    // Later calls do not read the configuration again
    std::env::set_var(DEFINITIONS_ENV, "/definitely/not/here/asterix.ini");
    let second = get_or_create_context().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(get_or_create_context))
        .collect();
    for h in handles {
        assert!(Arc::ptr_eq(&first, &h.join().unwrap().unwrap()));
    }
}
