use crate::repository::{employee_definition, generate_employee, Address, Employee};
use repobridge::errors::ErrorKind;
use repobridge::filter::Filter;
use repobridge::repository::{FindOptions, RepositoryExt, SortOrder};
use repobridge_int_test::test_util::{cleanup, create_test_context, run_test, BACKENDS};

#[test]
fn test_save_and_read_records() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, employee_definition("employees"))?;

                let mut employee = generate_employee(36);
                employee.session_token = Some("secret".to_string());
                let saved: Employee = repo.save_record(&employee, None)?;

                assert!(!saved.id.is_empty(), "{}", backend);
                assert_eq!(saved.name, employee.name);
                assert_eq!(saved.address, employee.address);
                // skipped fields are never stored
                assert_eq!(saved.session_token, None);

                let found: Employee = repo.get_one_as(&Filter::new().by_id(&saved.id))?;
                assert_eq!(found, saved);

                let raw = repo.get_one(&Filter::new().by_id(&saved.id))?;
                assert_eq!(raw.get_str("fullName"), Some(employee.name.as_str()));
                assert_eq!(raw.get_str("emailAddress"), Some(employee.email.as_str()));
                assert!(raw.contains_key("skills"));
                assert!(!raw.contains_key("session_token"));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_typed_listing_and_update() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, employee_definition("employees"))?;
                for age in [41, 29, 35] {
                    repo.save_record(&generate_employee(age), None)?;
                }

                let options = FindOptions::new().sort_by("age", SortOrder::Ascending);
                let employees: Vec<Employee> = repo.get_all_as(&Filter::new(), &options)?;
                let ages: Vec<i32> = employees.iter().map(|employee| employee.age).collect();
                assert_eq!(ages, vec![29, 35, 41], "{}", backend);

                let mut youngest = employees[0].clone();
                youngest.age = 30;
                youngest.address = Some(Address {
                    city: "Bergen".to_string(),
                    zip: "5003".to_string(),
                });
                let filter = Filter::new().by_id(&youngest.id);
                let updated: Employee = repo.save_record(&youngest, Some(&filter))?;
                assert_eq!(updated, youngest);

                // a record of the wrong shape
                let err = repo.get_one_as::<WrongShape>(&filter).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::InvalidInput);
            }
            Ok(())
        },
        cleanup,
    )
}

#[allow(dead_code)]
#[derive(Debug, Default, repobridge_derive::Record)]
struct WrongShape {
    #[record(bson = "fullName")]
    name: i64,
}
