use crate::common::{Recorder, database};
use strata::Pool;

pub async fn sequences<P: Pool + Clone>(pool: P) {
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();
    session
        .break_serial("orders")
        .await
        .expect("Could not drop the sequence");

    assert_eq!(session.serial("orders", 100, 0).await.expect("serial"), 100);
    assert_eq!(session.serial("orders", 100, 0).await.expect("serial"), 101);
    // An existing sequence keeps its start and step
    assert_eq!(session.serial("orders", 5, 10).await.expect("serial"), 102);

    session
        .break_serial("orders")
        .await
        .expect("Could not drop the sequence");
    assert_eq!(session.serial("orders", 7, 3).await.expect("serial"), 7);
    assert_eq!(session.serial("orders", 7, 3).await.expect("serial"), 10);

    session
        .batch(async |session| session.serial("orders", 7, 3).await)
        .await
        .map(|v| assert_eq!(v, 13))
        .expect("Could not draw a serial in a transaction");

    session
        .break_serial("orders")
        .await
        .expect("Could not drop the sequence");
    assert!(recorder.names().is_empty());
}
