//! Tests for the unmanaged command-channel cluster service.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::backend::{Deletion, JobBackend, ProvisioningBackend, ResourceId, Submission};
use crate::job::{JobError, JobKind, JobSpec};
use crate::test_support::ScriptedTransport;

use super::{StagingDir, UnmanagedClusterService, UnmanagedClusterSpec};

fn service_with_leader() -> (UnmanagedClusterService<ScriptedTransport>, ScriptedTransport) {
    let leader = ScriptedTransport::new();
    let service = UnmanagedClusterService::new(leader.clone(), Vec::new());
    (service, leader)
}

fn hadoop_spec() -> JobSpec {
    JobSpec::builder(JobKind::Hadoop {
        jarfile: Some(String::from("examples.jar")),
        classname: Some(String::from("org.example.WordCount")),
    })
    .property("mapreduce.job.reduces", "4")
    .arguments(["in dir", "out"])
    .build()
    .expect("spec should validate")
}

#[test]
fn hadoop_command_orders_jar_class_properties_then_arguments() {
    let (service, _leader) = service_with_leader();
    let command = service
        .render_job_command(&hadoop_spec())
        .expect("hadoop renders");
    assert_eq!(
        command,
        "hadoop jar examples.jar org.example.WordCount -Dmapreduce.job.reduces=4 'in dir' out"
    );
}

#[test]
fn spark_command_places_the_artifact_after_configuration() {
    let (service, _leader) = service_with_leader();
    let spec = JobSpec::builder(JobKind::Spark {
        jarfile: Some(String::from("app.jar")),
        classname: Some(String::from("org.example.Main")),
    })
    .property("spark.executor.cores", "2")
    .argument("100")
    .build()
    .expect("spec should validate");

    let command = service.render_job_command(&spec).expect("spark renders");
    assert_eq!(
        command,
        "spark-submit --class org.example.Main --conf spark.executor.cores=2 app.jar 100"
    );
}

#[test]
fn pyspark_command_submits_the_script() {
    let (service, _leader) = service_with_leader();
    let spec = JobSpec::builder(JobKind::PySpark {
        script: String::from("jobs/train.py"),
    })
    .argument("--epochs=3")
    .build()
    .expect("spec should validate");

    let command = service.render_job_command(&spec).expect("pyspark renders");
    assert_eq!(command, "spark-submit jobs/train.py --epochs=3");
}

#[test]
fn spark_sql_is_rejected_as_a_contract_violation() {
    let (service, _leader) = service_with_leader();
    let spec = JobSpec::builder(JobKind::SparkSql {
        query_file: String::from("query.sql"),
    })
    .build()
    .expect("spec should validate");

    let err = service
        .render_job_command(&spec)
        .expect_err("spark-sql has no command form");
    assert!(matches!(err, JobError::Contract { .. }));
}

#[test]
fn spark_without_a_jarfile_is_rejected_on_this_channel() {
    let (service, _leader) = service_with_leader();
    let spec = JobSpec::builder(JobKind::Spark {
        jarfile: None,
        classname: Some(String::from("org.example.Main")),
    })
    .build()
    .expect("spec should validate");

    let err = service
        .render_job_command(&spec)
        .expect_err("command channel needs a jar");
    assert!(matches!(err, JobError::Contract { .. }));
}

#[tokio::test]
async fn submit_job_completes_synchronously_with_zero_pending_time() {
    let (service, leader) = service_with_leader();
    leader.push_output(Some(0), "job output", "");

    let submission = service
        .submit_job(&hadoop_spec())
        .await
        .expect("submission succeeds");

    let Submission::Completed(result) = submission else {
        panic!("command channel submissions are synchronous");
    };
    assert_eq!(result.pending_time, Duration::ZERO);
    assert_eq!(result.wall_time(), result.run_time);
}

#[tokio::test]
async fn submit_job_captures_stdout_when_requested() {
    let dir = tempfile::tempdir().expect("temp dir");
    let capture = Utf8PathBuf::from_path_buf(dir.path().join("stdout.txt"))
        .expect("utf-8 temp path");

    let (service, leader) = service_with_leader();
    leader.push_output(Some(0), "counted 42 words", "");

    let spec = JobSpec::builder(JobKind::Hadoop {
        jarfile: Some(String::from("examples.jar")),
        classname: None,
    })
    .stdout_path(capture.clone())
    .build()
    .expect("spec should validate");
    service.submit_job(&spec).await.expect("submission succeeds");

    let captured = std::fs::read_to_string(capture).expect("capture file exists");
    assert_eq!(captured, "counted 42 words");
}

#[tokio::test]
async fn non_zero_exit_surfaces_as_a_submission_error() {
    let (service, leader) = service_with_leader();
    leader.push_output(Some(1), "", "container failed");

    let err = service
        .submit_job(&hadoop_spec())
        .await
        .expect_err("failing job must error");
    assert!(
        matches!(err, JobError::Submission { ref message, .. } if message.contains("status 1")),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn transport_failures_never_leak_their_own_type() {
    let (service, leader) = service_with_leader();
    leader.push_spawn_failure("ssh unavailable");

    let err = service
        .submit_job(&hadoop_spec())
        .await
        .expect_err("dispatch failure must error");
    assert!(matches!(err, JobError::Submission { source: Some(_), .. }));
}

#[tokio::test]
async fn create_resource_bootstraps_every_node_then_starts_the_leader() {
    let leader = ScriptedTransport::new();
    let workers = vec![ScriptedTransport::new(), ScriptedTransport::new()];
    leader.push_success(); // bootstrap
    leader.push_success(); // start
    for worker in &workers {
        worker.push_success();
    }

    let service = UnmanagedClusterService::new(leader.clone(), workers.clone());
    let spec = UnmanagedClusterSpec {
        bootstrap_command: Some(String::from("install-stack")),
        start_command: Some(String::from("start-all")),
    };
    service
        .create_resource(&ResourceId::new("cluster-1"), &spec)
        .await
        .expect("creation succeeds");

    assert_eq!(
        leader.commands(),
        vec![String::from("install-stack"), String::from("start-all")]
    );
    for worker in &workers {
        assert_eq!(worker.commands(), vec![String::from("install-stack")]);
    }
}

#[tokio::test]
async fn delete_resource_without_a_stop_command_reports_absent() {
    let (service, leader) = service_with_leader();
    let deletion = service
        .delete_resource(&ResourceId::new("cluster-1"))
        .await
        .expect("deletion succeeds");
    assert_eq!(deletion, Deletion::AlreadyAbsent);
    assert!(leader.commands().is_empty(), "no command should run");
}

#[tokio::test]
async fn delete_resource_treats_a_failing_stop_as_already_absent() {
    let leader = ScriptedTransport::new();
    leader.push_output(Some(1), "", "no such service");
    let service = UnmanagedClusterService::new(leader.clone(), Vec::new())
        .stop_command("stop-all");

    let deletion = service
        .delete_resource(&ResourceId::new("cluster-1"))
        .await
        .expect("deletion swallows a failing stop");
    assert_eq!(deletion, Deletion::AlreadyAbsent);
}

#[tokio::test]
async fn staging_directories_are_created_and_removed_with_escaped_paths() {
    let (service, leader) = service_with_leader();
    leader.push_success();
    leader.push_success();

    let handle = service
        .create_dependency(&StagingDir::new("/srv/gantry staging"))
        .await
        .expect("dependency creation succeeds");
    let deletion = service
        .delete_dependency(&handle)
        .await
        .expect("dependency deletion succeeds");

    assert_eq!(deletion, Deletion::Deleted);
    assert_eq!(
        leader.commands(),
        vec![
            String::from("mkdir -p '/srv/gantry staging'"),
            String::from("rm -rf '/srv/gantry staging'"),
        ]
    );
}

#[tokio::test]
async fn probe_resource_checks_leader_reachability() {
    let (service, leader) = service_with_leader();
    leader.push_success();

    service
        .probe_resource(&ResourceId::new("cluster-1"))
        .await
        .expect("probe succeeds");
    assert_eq!(leader.commands(), vec![String::from("true")]);
}
