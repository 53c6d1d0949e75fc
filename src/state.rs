use std::sync::Arc;

use crate::{
    cqrs::{
        AggregateToysQueryHandler, CountToysQueryHandler, CreateToyCommandHandler,
        CreateToysCommandHandler, DeleteToyCommandHandler, FindToysQueryHandler, GetToyQueryHandler,
        HealthQueryHandler, UpdateToysCommandHandler,
    },
    repositories::ToyRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub create_toy_command_handler: Arc<CreateToyCommandHandler>,
    pub create_toys_command_handler: Arc<CreateToysCommandHandler>,
    pub update_toys_command_handler: Arc<UpdateToysCommandHandler>,
    pub delete_toy_command_handler: Arc<DeleteToyCommandHandler>,
    pub find_toys_query_handler: Arc<FindToysQueryHandler>,
    pub get_toy_query_handler: Arc<GetToyQueryHandler>,
    pub count_toys_query_handler: Arc<CountToysQueryHandler>,
    pub aggregate_toys_query_handler: Arc<AggregateToysQueryHandler>,
    pub health_query_handler: Arc<HealthQueryHandler>,
}

impl AppState {
    pub fn new(repository: Arc<dyn ToyRepository>) -> AppState {
        AppState {
            create_toy_command_handler: Arc::new(CreateToyCommandHandler::new(repository.clone())),
            create_toys_command_handler: Arc::new(CreateToysCommandHandler::new(
                repository.clone(),
            )),
            update_toys_command_handler: Arc::new(UpdateToysCommandHandler::new(
                repository.clone(),
            )),
            delete_toy_command_handler: Arc::new(DeleteToyCommandHandler::new(repository.clone())),
            find_toys_query_handler: Arc::new(FindToysQueryHandler::new(repository.clone())),
            get_toy_query_handler: Arc::new(GetToyQueryHandler::new(repository.clone())),
            count_toys_query_handler: Arc::new(CountToysQueryHandler::new(repository.clone())),
            aggregate_toys_query_handler: Arc::new(AggregateToysQueryHandler::new(
                repository.clone(),
            )),
            health_query_handler: Arc::new(HealthQueryHandler::new(repository)),
        }
    }
}
