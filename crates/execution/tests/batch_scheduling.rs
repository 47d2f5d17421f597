//! End-to-end scheduling tests: memoization, policies, scoped imports and
//! dependency deferral across whole batch runs.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{count, space_x, type_of, upstream_of, Step};
use labflow_core::{Dimension, ExecutionMetadata, ParameterSpace};
use labflow_execution::{
    subtasks_of, BatchTask, ExecError, ExecutionPolicy, ImportRef, Lab, Report, Task, TaskContext,
    SUBTASKS_KEY,
};
use labflow_storage::records::{ATTRIBUTES_KEY, DISCRIMINATORS_KEY};
use labflow_storage::{retrieve_json, MemoryStorage, StorageService};

fn lab() -> (Lab, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (Lab::new(storage.clone()), storage)
}

#[tokio::test]
async fn test_use_existing_rerun_reuses_every_subtask() {
    let (lab, storage) = lab();
    let prepare = Step::new("Prepare");
    let train = Step::new("Train").importing("Prepare");
    let (prepare_runs, train_runs) = (prepare.attempts(), train.attempts());

    let mut batch = BatchTask::new("Experiment")
        .with_task(prepare)
        .with_task(train)
        .with_parameter_space(space_x(&[1, 2]))
        .with_execution_policy(ExecutionPolicy::UseExisting);

    let first = lab.run(&mut batch).await.unwrap();
    let first_subtasks = subtasks_of(storage.as_ref(), &first).await.unwrap();
    assert_eq!(first_subtasks.len(), 4);
    assert_eq!((count(&prepare_runs), count(&train_runs)), (2, 2));

    let second = lab.run(&mut batch).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(subtasks_of(storage.as_ref(), &second).await.unwrap(), first_subtasks);
    assert_eq!((count(&prepare_runs), count(&train_runs)), (2, 2));
}

#[tokio::test]
async fn test_use_existing_returns_to_an_earlier_point() {
    let (lab, storage) = lab();
    let mut seen = Vec::new();

    for x in [1, 2, 1] {
        let train = Step::new("Train");
        let runs = train.attempts();
        let mut batch = BatchTask::new("Experiment")
            .with_task(train)
            .with_parameter_space(space_x(&[x]))
            .with_execution_policy(ExecutionPolicy::UseExisting);

        let id = lab.run(&mut batch).await.unwrap();
        let subtasks = subtasks_of(storage.as_ref(), &id).await.unwrap();
        assert_eq!(subtasks.len(), 1);
        seen.push((subtasks[0].clone(), count(&runs)));
    }

    let (e1, e2, e3) = (&seen[0], &seen[1], &seen[2]);
    assert_eq!((e1.1, e2.1), (1, 1));
    assert_ne!(e1.0, e2.0);
    assert_eq!(e3.0, e1.0);
    assert_eq!(e3.1, 0);
}

#[tokio::test]
async fn test_each_configuration_imports_its_own_upstream() {
    let (lab, storage) = lab();
    let mut batch = BatchTask::new("Experiment")
        .with_task(Step::new("Prepare"))
        .with_task(Step::new("Train").importing("Prepare"))
        .with_parameter_space(space_x(&[1, 2]));

    let id = lab.run(&mut batch).await.unwrap();
    let subtasks = subtasks_of(storage.as_ref(), &id).await.unwrap();
    let [p1, t1, p2, t2] = subtasks.as_slice() else {
        panic!("unexpected subtasks {:?}", subtasks);
    };

    assert_eq!(type_of(storage.as_ref(), p1).await, "Prepare");
    assert_eq!(type_of(storage.as_ref(), t2).await, "Train");
    assert_eq!(upstream_of(storage.as_ref(), t1).await, vec![p1.clone()]);
    assert_eq!(upstream_of(storage.as_ref(), t2).await, vec![p2.clone()]);
}

#[tokio::test]
async fn test_repeated_point_reuses_execution_within_one_run() {
    let (lab, storage) = lab();
    let train = Step::new("Train");
    let runs = train.attempts();
    let mut batch = BatchTask::new("Experiment")
        .with_task(train)
        .with_parameter_space(space_x(&[1, 2, 1]))
        .with_execution_policy(ExecutionPolicy::RunAgain);

    let id = lab.run(&mut batch).await.unwrap();
    let subtasks = subtasks_of(storage.as_ref(), &id).await.unwrap();
    assert_eq!(count(&runs), 2);
    assert_eq!(subtasks.len(), 2);

    let disc: BTreeMap<String, String> =
        retrieve_json(storage.as_ref(), &subtasks[0], DISCRIMINATORS_KEY)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(disc["x"], "1");

    // A new run does not count as the same aggregate
    let again = lab.run(&mut batch).await.unwrap();
    assert_eq!(count(&runs), 4);
    let rerun = subtasks_of(storage.as_ref(), &again).await.unwrap();
    assert!(rerun.iter().all(|id| !subtasks.contains(id)));
}

#[tokio::test]
async fn test_stale_upstream_outside_scope_defers_consumer() {
    let (lab, storage) = lab();
    let mut first = BatchTask::new("Experiment")
        .with_task(Step::new("Prepare"))
        .with_task(Step::new("Train").importing("Prepare"))
        .with_parameter_space(space_x(&[1]));
    let first_id = lab.run(&mut first).await.unwrap();
    let stale_prepare = subtasks_of(storage.as_ref(), &first_id).await.unwrap()[0].clone();

    // Consumer registered first: the stale Prepare output must not satisfy it
    let train = Step::new("Train").importing("Prepare");
    let train_runs = train.attempts();
    let mut second = BatchTask::new("Experiment")
        .with_task(train)
        .with_task(Step::new("Prepare"))
        .with_parameter_space(space_x(&[1]))
        .with_execution_policy(ExecutionPolicy::RunAgain);
    let second_id = lab.run(&mut second).await.unwrap();

    let subtasks = subtasks_of(storage.as_ref(), &second_id).await.unwrap();
    let [prepare, train] = subtasks.as_slice() else {
        panic!("unexpected subtasks {:?}", subtasks);
    };
    assert_ne!(*prepare, stale_prepare);
    assert_eq!(type_of(storage.as_ref(), prepare).await, "Prepare");
    assert_eq!(upstream_of(storage.as_ref(), train).await, vec![prepare.clone()]);
    assert_eq!(count(&train_runs), 2);
}

#[tokio::test]
async fn test_mutual_imports_are_a_fatal_cycle() {
    let (lab, storage) = lab();
    let a = Step::new("A").importing("B");
    let b = Step::new("B").importing("A");
    let (a_runs, b_runs) = (a.attempts(), b.attempts());
    let mut batch = BatchTask::new("Experiment")
        .with_task(a)
        .with_task(b)
        .with_parameter_space(space_x(&[1]));

    let err = lab.run(&mut batch).await.unwrap_err();
    let ExecError::DependencyCycle { reasons } = &err else {
        panic!("expected a dependency cycle, got {}", err);
    };
    assert_eq!(reasons.len(), 2);
    assert!(reasons[0].contains("task-latest://B"));
    assert!(reasons[1].contains("task-latest://A"));
    assert!(!err.is_deferrable());

    // |queue| + 1 attempts
    assert_eq!(count(&a_runs) + count(&b_runs), 3);
    // Failed attempts and the batch itself leave nothing behind
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn test_ask_existing_follows_the_operator() {
    let (lab, storage) = lab();
    let mut first = BatchTask::new("Experiment")
        .with_task(Step::new("Prepare"))
        .with_task(Step::new("Train").importing("Prepare"))
        .with_parameter_space(space_x(&[1]));
    let first_id = lab.run(&mut first).await.unwrap();
    let before = subtasks_of(storage.as_ref(), &first_id).await.unwrap();

    let asked = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&asked);
    let prompt = move |existing: &ExecutionMetadata| {
        log.lock().unwrap().push(existing.task_type.clone());
        existing.task_type == "Train"
    };
    let mut second = BatchTask::new("Experiment")
        .with_task(Step::new("Prepare"))
        .with_task(Step::new("Train").importing("Prepare"))
        .with_parameter_space(space_x(&[1]))
        .with_execution_policy(ExecutionPolicy::AskExisting)
        .with_prompt(prompt);
    let second_id = lab.run(&mut second).await.unwrap();
    let after = subtasks_of(storage.as_ref(), &second_id).await.unwrap();

    assert_eq!(*asked.lock().unwrap(), vec!["Prepare", "Train"]);
    assert_eq!(after[0], before[0]);
    assert_ne!(after[1], before[1]);
    assert_eq!(upstream_of(storage.as_ref(), &after[1]).await, vec![before[0].clone()]);
}

struct SubtaskCount(Arc<AtomicUsize>);

#[async_trait]
impl Report for SubtaskCount {
    fn report_type(&self) -> &str {
        "SubtaskCount"
    }

    async fn execute(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let subtasks = subtasks_of(ctx.storage().as_ref(), ctx.id()).await?;
        self.0.store(subtasks.len(), Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_nested_batch_inherits_configuration_and_scope() {
    let (lab, storage) = lab();
    let inner_seen = Arc::new(AtomicUsize::new(0));

    let mut inner = BatchTask::new("Sweep")
        .with_task(Step::new("Train").discriminated_by("y").importing("Prepare"))
        .with_parameter_space(ParameterSpace::new([Dimension::discrete("y", ["a", "b"])]));
    inner.base_mut().add_report(Arc::new(SubtaskCount(Arc::clone(&inner_seen))));

    let mut outer = BatchTask::new("Experiment")
        .with_task(Step::new("Prepare"))
        .with_task(inner)
        .with_parameter_space(space_x(&[3]));

    let outer_id = lab.run(&mut outer).await.unwrap();
    let outer_subtasks = subtasks_of(storage.as_ref(), &outer_id).await.unwrap();
    let [prepare, sweep] = outer_subtasks.as_slice() else {
        panic!("unexpected subtasks {:?}", outer_subtasks);
    };
    assert_eq!(type_of(storage.as_ref(), sweep).await, "Sweep");
    assert_eq!(inner_seen.load(Ordering::SeqCst), 2);

    for train in subtasks_of(storage.as_ref(), sweep).await.unwrap() {
        let disc: BTreeMap<String, String> =
            retrieve_json(storage.as_ref(), &train, DISCRIMINATORS_KEY)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(disc["x"], "3");
        assert!(disc["y"] == "a" || disc["y"] == "b");
        assert_eq!(upstream_of(storage.as_ref(), &train).await, vec![prepare.clone()]);
    }
}

#[tokio::test]
async fn test_scope_resets_per_configuration_while_subtasks_accumulate() {
    let (lab, storage) = lab();
    let consumer = Step::new("Consumer")
        .importing_ref(ImportRef::latest_with("Producer", [("x", "1")]));
    let mut batch = BatchTask::new("Experiment")
        .with_task(Step::new("Producer"))
        .with_task(consumer)
        .with_parameter_space(space_x(&[1, 2]));

    // Producer x=1 exists and was used by this run, but is only visible in
    // the configuration that produced it
    let err = lab.run(&mut batch).await.unwrap_err();
    let ExecError::DependencyCycle { reasons } = &err else {
        panic!("expected a dependency cycle, got {}", err);
    };
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("not in scope"));

    // Work of the earlier configuration stays persisted
    let producers = storage
        .list_contexts("Producer", &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(producers.len(), 2);
    assert_eq!(storage.list_contexts("Consumer", &BTreeMap::new()).await.unwrap().len(), 1);
    assert!(storage.list_contexts("Experiment", &BTreeMap::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inherited_values_never_override_explicit_ones() {
    let (lab, storage) = lab();
    let inner = BatchTask::new("Sweep")
        .with_task(Step::new("Train"))
        .with_parameter_space(space_x(&[7]));

    let mut outer = BatchTask::new("Experiment")
        .with_task(inner)
        .with_parameter_space(space_x(&[1]));
    let outer_id = lab.run(&mut outer).await.unwrap();

    let sweep = subtasks_of(storage.as_ref(), &outer_id).await.unwrap()[0].clone();
    let train = subtasks_of(storage.as_ref(), &sweep).await.unwrap()[0].clone();
    let attributes: BTreeMap<String, String> =
        retrieve_json(storage.as_ref(), &sweep, ATTRIBUTES_KEY)
            .await
            .unwrap()
            .unwrap();
    assert!(attributes.contains_key(SUBTASKS_KEY));

    let disc: BTreeMap<String, String> = retrieve_json(storage.as_ref(), &train, DISCRIMINATORS_KEY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(disc["x"], "7");
}
